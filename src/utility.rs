use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(windows)]
pub fn to_wstring(s: &str) -> Vec<u16> {
    use std::{ffi::OsStr, os::windows::ffi::OsStrExt};

    OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// Joins arguments into one command line, quoting any that contain
/// whitespace or are empty. Used where the OS takes a single parameter string.
pub fn join_args(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            if arg.is_empty() || arg.chars().any(char::is_whitespace) {
                format!("\"{}\"", arg.replace('"', "\\\""))
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

static UNIQUE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Process-unique token for temp names: `<pid>_<timestamp>_<counter>`.
pub fn unique_token() -> String {
    let n = UNIQUE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S%3f");
    format!("{}_{}_{}", std::process::id(), stamp, n)
}
