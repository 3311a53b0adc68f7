use std::{
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::Arc,
    thread,
};

use crate::{error::EncodeError, logging::LogSink, temp_dirs::TempDirs};
use crate::{debug, info, warn};

const STDERR_TAIL: usize = 20;

/// One clip to turn into an animated GIF.
#[derive(Debug, Clone)]
pub struct ClipRequest {
    pub input: PathBuf,
    /// Seconds from the start of the input.
    pub start: f64,
    pub end: f64,
    pub fps: f64,
    pub width: u32,
}

impl ClipRequest {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    fn validate(&self) -> Result<(), EncodeError> {
        if !self.start.is_finite()
            || !self.end.is_finite()
            || self.start < 0.0
            || self.end <= self.start
        {
            return Err(EncodeError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        if !self.input.is_file() {
            return Err(EncodeError::MissingInput(self.input.clone()));
        }
        Ok(())
    }
}

pub trait ClipEncoder {
    /// Encodes the clip and returns the produced file. `progress` receives
    /// percentages in `0.0..=100.0`.
    fn encode(
        &self,
        request: &ClipRequest,
        progress: &mut dyn FnMut(f64),
    ) -> Result<PathBuf, EncodeError>;
}

/// Single-pass ffmpeg palette GIF encode.
pub struct FfmpegGifEncoder {
    ffmpeg: String,
    temp: Arc<TempDirs>,
    log: Arc<dyn LogSink>,
}

impl FfmpegGifEncoder {
    pub fn new(ffmpeg: impl Into<String>, temp: Arc<TempDirs>, log: Arc<dyn LogSink>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            temp,
            log,
        }
    }

    pub fn arguments(request: &ClipRequest, output: &Path) -> Vec<String> {
        let filter = format!(
            "fps={},scale={}:-2:flags=lanczos,split[a][b];[a]palettegen[p];[b][p]paletteuse",
            request.fps, request.width
        );
        vec![
            "-y".into(),
            "-ss".into(),
            format!("{:.3}", request.start),
            "-t".into(),
            format!("{:.3}", request.duration()),
            "-i".into(),
            request.input.to_string_lossy().into_owned(),
            "-vf".into(),
            filter,
            "-loop".into(),
            "0".into(),
            "-progress".into(),
            "pipe:1".into(),
            "-nostats".into(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

impl ClipEncoder for FfmpegGifEncoder {
    fn encode(
        &self,
        request: &ClipRequest,
        progress: &mut dyn FnMut(f64),
    ) -> Result<PathBuf, EncodeError> {
        request.validate()?;

        let out_dir = self.temp.create()?;
        let output = out_dir.join("output.gif");
        let args = Self::arguments(request, &output);
        info!(
            self.log,
            "[ENCODER] {} {}",
            self.ffmpeg,
            crate::utility::join_args(&args)
        );

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EncodeError::Launch {
                program: self.ffmpeg.clone(),
                source,
            })?;

        // stderr is collected on its own thread; ffmpeg writes a lot there.
        let stderr = child.stderr.take().map(|pipe| {
            let log = Arc::clone(&self.log);
            thread::spawn(move || {
                let mut tail = Vec::<String>::new();
                for line in BufReader::new(pipe).lines().map_while(Result::ok) {
                    debug!(log, "[ENCODER][FFMPEG] {}", line);
                    if tail.len() == STDERR_TAIL {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
                tail
            })
        });

        let duration = request.duration();
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                if let Some(pct) = parse_progress_line(&line, duration) {
                    progress(pct);
                }
            }
        }

        let tail = stderr
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
            .join("\n");
        let status = child.wait()?;

        if !status.success() {
            warn!(self.log, "[ENCODER] ffmpeg failed with {:?}", status.code());
            return Err(EncodeError::Failed {
                status: status.code(),
                stderr: tail,
            });
        }
        if !output.is_file() {
            return Err(EncodeError::NoOutput(output));
        }

        progress(100.0);
        info!(self.log, "[ENCODER] Wrote {}", output.display());
        Ok(output)
    }
}

/// Turns one `-progress` key/value line into a percentage of `duration`.
/// `out_time_ms` is in microseconds despite its name.
pub fn parse_progress_line(line: &str, duration: f64) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_ms" | "out_time_us" => {
            if duration <= 0.0 {
                return None;
            }
            let micros: f64 = value.trim().parse().ok()?;
            Some((micros / 1_000_000.0 / duration * 100.0).clamp(0.0, 100.0))
        }
        "progress" if value.trim() == "end" => Some(100.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::logging::MemoryLog;

    fn encoder(ffmpeg: &str, root: &Path) -> FfmpegGifEncoder {
        let log: Arc<dyn LogSink> = Arc::new(MemoryLog::default());
        let temps = Arc::new(TempDirs::new(root.to_path_buf(), "gif_temp_", Arc::clone(&log)));
        FfmpegGifEncoder::new(ffmpeg, temps, log)
    }

    fn request(input: PathBuf, start: f64, end: f64) -> ClipRequest {
        ClipRequest {
            input,
            start,
            end,
            fps: 15.0,
            width: 1280,
        }
    }

    #[test]
    fn progress_lines_map_to_percentages() {
        assert_eq!(parse_progress_line("out_time_ms=2000000", 4.0), Some(50.0));
        assert_eq!(parse_progress_line("out_time_us=8000000", 4.0), Some(100.0));
        assert_eq!(parse_progress_line("out_time_ms=N/A", 4.0), None);
        assert_eq!(parse_progress_line("progress=end", 4.0), Some(100.0));
        assert_eq!(parse_progress_line("progress=continue", 4.0), None);
        assert_eq!(parse_progress_line("frame=12", 4.0), None);
    }

    #[test]
    fn arguments_seek_trim_and_scale() {
        let req = request(PathBuf::from("in.mp4"), 1.5, 4.0);
        let args = FfmpegGifEncoder::arguments(&req, Path::new("out.gif"));
        assert_eq!(&args[..5], ["-y", "-ss", "1.500", "-t", "2.500"]);
        assert!(args.iter().any(|a| a.starts_with("fps=15,scale=1280:-2")));
        assert_eq!(args.last().map(String::as_str), Some("out.gif"));
    }

    #[test]
    fn inverted_range_is_rejected_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mp4");
        fs::write(&input, b"x").unwrap();

        let err = encoder("ffmpeg", dir.path())
            .encode(&request(input, 5.0, 5.0), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, EncodeError::InvalidRange { .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_input_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = encoder("ffmpeg", dir.path())
            .encode(&request(dir.path().join("none.mp4"), 0.0, 1.0), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, EncodeError::MissingInput(_)));
    }

    #[test]
    fn missing_encoder_binary_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mp4");
        fs::write(&input, b"x").unwrap();

        let err = encoder("no-such-ffmpeg-binary-91c2", dir.path())
            .encode(&request(input, 0.0, 1.0), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, EncodeError::Launch { .. }));
    }
}
