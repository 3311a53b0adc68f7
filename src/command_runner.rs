use std::{
    io::{BufRead, BufReader, Read},
    path::PathBuf,
    process::{Command, Stdio},
    sync::Arc,
    thread,
};

use crate::{
    error::LaunchFailure,
    logging::{Level, LogSink},
};
use crate::info;

/// One external command. Arguments are kept separate so each runner can
/// quote them the way its launch API expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
        }
    }

    #[cfg(any(windows, test))]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn display(&self) -> String {
        format!("{} {}", self.program, crate::utility::join_args(&self.args))
    }
}

/// Runs a command and waits for it to exit. `Ok(None)` means the process
/// ran but reported no exit code.
pub trait PrivilegedCommandRunner: Send + Sync {
    fn run(&self, command: &CommandSpec) -> Result<Option<i32>, LaunchFailure>;
}

/// Launches through the OS elevation prompt (UAC `runas` on Windows,
/// `sudo` elsewhere). Blocks until the process exits, with no timeout: an
/// unanswered prompt blocks the caller.
pub struct ElevatedRunner;

#[cfg(windows)]
impl PrivilegedCommandRunner for ElevatedRunner {
    fn run(&self, command: &CommandSpec) -> Result<Option<i32>, LaunchFailure> {
        use std::mem;

        use windows::{
            core::{w, PCWSTR},
            Win32::{
                Foundation::CloseHandle,
                System::Threading::{GetExitCodeProcess, WaitForSingleObject, INFINITE},
                UI::{
                    Shell::{ShellExecuteExW, SEE_MASK_NOASYNC, SEE_MASK_NOCLOSEPROCESS, SHELLEXECUTEINFOW},
                    WindowsAndMessaging::SW_HIDE,
                },
            },
        };

        use crate::utility::to_wstring;

        let file = to_wstring(&command.program);
        let params = to_wstring(&crate::utility::join_args(&command.args));
        let dir = command
            .working_dir
            .as_ref()
            .map(|d| to_wstring(&d.to_string_lossy()));

        let mut info: SHELLEXECUTEINFOW = unsafe { mem::zeroed() };
        info.cbSize = mem::size_of::<SHELLEXECUTEINFOW>() as u32;
        info.fMask = SEE_MASK_NOCLOSEPROCESS | SEE_MASK_NOASYNC;
        info.lpVerb = w!("runas");
        info.lpFile = PCWSTR(file.as_ptr());
        info.lpParameters = PCWSTR(params.as_ptr());
        info.lpDirectory = dir
            .as_ref()
            .map(|d| PCWSTR(d.as_ptr()))
            .unwrap_or(PCWSTR::null());
        info.nShow = SW_HIDE.0;

        unsafe {
            ShellExecuteExW(&mut info)
                .map_err(|e| LaunchFailure::new(&command.program, e.message()))?;

            if info.hProcess.is_invalid() {
                // Launched, but the shell handed back no process to wait on.
                return Ok(None);
            }

            let _ = WaitForSingleObject(info.hProcess, INFINITE);
            let mut code = 0u32;
            let status = GetExitCodeProcess(info.hProcess, &mut code)
                .ok()
                .map(|_| code as i32);
            let _ = CloseHandle(info.hProcess);
            Ok(status)
        }
    }
}

#[cfg(not(windows))]
impl PrivilegedCommandRunner for ElevatedRunner {
    fn run(&self, command: &CommandSpec) -> Result<Option<i32>, LaunchFailure> {
        let mut cmd = Command::new("sudo");
        cmd.arg(&command.program).args(&command.args);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }
        cmd.status()
            .map(|status| status.code())
            .map_err(|e| LaunchFailure::new(&command.program, e.to_string()))
    }
}

/// Runs a command without elevation and streams its stdout/stderr into the
/// log line by line. Both pipes are drained on their own threads so a full
/// stderr buffer cannot stall a process that is still writing stdout.
pub struct CapturingRunner {
    log: Arc<dyn LogSink>,
}

impl CapturingRunner {
    pub fn new(log: Arc<dyn LogSink>) -> Self {
        Self { log }
    }
}

impl PrivilegedCommandRunner for CapturingRunner {
    fn run(&self, command: &CommandSpec) -> Result<Option<i32>, LaunchFailure> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| LaunchFailure::new(&command.program, e.to_string()))?;
        info!(self.log, "[LOCKSCREEN][EXEC] Started `{}`", command.display());

        let out = child
            .stdout
            .take()
            .map(|pipe| drain_lines(pipe, Arc::clone(&self.log), Level::Info));
        let err = child
            .stderr
            .take()
            .map(|pipe| drain_lines(pipe, Arc::clone(&self.log), Level::Error));

        for handle in [out, err].into_iter().flatten() {
            let _ = handle.join();
        }

        child
            .wait()
            .map(|status| status.code())
            .map_err(|e| LaunchFailure::new(&command.program, e.to_string()))
    }
}

fn drain_lines<R>(pipe: R, log: Arc<dyn LogSink>, level: Level) -> thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let reader = BufReader::new(pipe);
        for line in reader.lines() {
            let Ok(line) = line else {
                break;
            };
            let line = line.trim_end();
            if !line.is_empty() {
                crate::logging::emit(&*log, level, format_args!("  {line}"));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemoryLog;

    #[test]
    fn display_quotes_arguments() {
        let cmd = CommandSpec::new("icacls", ["C:\\a b", "/T"]);
        assert_eq!(cmd.display(), "icacls \"C:\\a b\" /T");
        assert_eq!(cmd.in_dir("x").working_dir, Some(PathBuf::from("x")));
    }

    #[test]
    fn capturing_runner_reports_missing_program_as_launch_failure() {
        let runner = CapturingRunner::new(Arc::new(MemoryLog::default()));
        let err = runner
            .run(&CommandSpec::new("definitely-not-a-real-binary-7f3a", Vec::<String>::new()))
            .unwrap_err();
        assert_eq!(err.program, "definitely-not-a-real-binary-7f3a");
    }

    #[cfg(unix)]
    #[test]
    fn capturing_runner_streams_both_pipes() {
        let log = Arc::new(MemoryLog::default());
        let runner = CapturingRunner::new(log.clone());
        let status = runner
            .run(&CommandSpec::new("sh", ["-c", "echo out-line; echo err-line 1>&2; exit 3"]))
            .unwrap();
        assert_eq!(status, Some(3));
        assert!(log.contains(Level::Info, "out-line"));
        assert!(log.contains(Level::Error, "err-line"));
    }
}
