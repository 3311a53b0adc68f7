use std::{
    fs::{self, File, OpenOptions},
    io::Read,
    path::Path,
};

use crate::logging::LogSink;
use crate::{info, warn};

/// Creates and removes a scratch file in `dir`, logging whether the
/// current process can write there. Never gates anything.
pub fn check_write_access(dir: &Path, log: &dyn LogSink) -> bool {
    let scratch = dir.join(format!("write_test_{}.tmp", crate::utility::unique_token()));
    let result = OpenOptions::new().write(true).create_new(true).open(&scratch);
    match result {
        Ok(file) => {
            drop(file);
            let _ = fs::remove_file(&scratch);
            info!(log, "[LOCKSCREEN][WRITE] {} is writable", dir.display());
            true
        }
        Err(e) => {
            warn!(log, "[LOCKSCREEN][WRITE] {} is not writable: {}", dir.display(), e);
            false
        }
    }
}

/// Logs every file under `root` with the image format sniffed from its
/// leading bytes, e.g. a GIF sitting behind a `.jpg` name.
pub fn log_file_formats(root: &Path, log: &dyn LogSink) {
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            warn!(log, "[LOCKSCREEN][FORMAT] Cannot read {}", dir.display());
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            match entry.file_type() {
                Ok(t) if t.is_dir() => stack.push(path),
                Ok(t) if t.is_file() => {
                    info!(log, "[LOCKSCREEN][FORMAT] {} -> {}", path.display(), sniff_format(&path));
                }
                _ => {}
            }
        }
    }
}

pub fn sniff_format(path: &Path) -> String {
    let mut header = [0u8; 256];
    let read = File::open(path).and_then(|mut f| f.read(&mut header));
    match read {
        Ok(n) => match image::guess_format(&header[..n]) {
            Ok(format) => format!("{format:?}").to_lowercase(),
            Err(_) => "unknown".to_string(),
        },
        Err(_) => "unreadable".to_string(),
    }
}
