use std::{
    fmt,
    fs::OpenOptions,
    io::{self, Write},
    path::Path,
    sync::mpsc::{self, Sender},
    thread::{self, JoinHandle},
};

/* =========================
   LEVELS
   ========================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "trace" | "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/* =========================
   SINK
   ========================= */

/// Destination for log lines. Every component receives one of these
/// instead of reaching for a global.
pub trait LogSink: Send + Sync {
    fn enabled(&self, _level: Level) -> bool {
        true
    }

    fn write(&self, level: Level, msg: &str);
}

#[inline]
pub fn emit(sink: &dyn LogSink, level: Level, args: fmt::Arguments<'_>) {
    if sink.enabled(level) {
        sink.write(level, &args.to_string());
    }
}

/// Appends timestamped lines to a file from a dedicated writer thread.
pub struct FileLog {
    threshold: Level,
    tx: Option<Sender<String>>,
    worker: Option<JoinHandle<()>>,
}

impl FileLog {
    pub fn open(path: &Path, threshold: Level) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let (tx, rx) = mpsc::channel::<String>();

        let worker = thread::Builder::new()
            .name("log-writer".into())
            .spawn(move || {
                while let Ok(line) = rx.recv() {
                    let _ = writeln!(file, "{line}");
                    let _ = file.flush();
                }
            })?;

        Ok(Self {
            threshold,
            tx: Some(tx),
            worker: Some(worker),
        })
    }
}

impl LogSink for FileLog {
    fn enabled(&self, level: Level) -> bool {
        level >= self.threshold
    }

    fn write(&self, level: Level, msg: &str) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(format!("{} [{}] {msg}", timestamp(), level.as_str()));
        }
    }
}

impl Drop for FileLog {
    fn drop(&mut self) {
        // Closing the channel lets the writer drain and exit.
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Falls back to stderr when the log file cannot be opened.
pub struct StderrLog {
    pub threshold: Level,
}

impl LogSink for StderrLog {
    fn enabled(&self, level: Level) -> bool {
        level >= self.threshold
    }

    fn write(&self, level: Level, msg: &str) {
        eprintln!("{} [{}] {msg}", timestamp(), level.as_str());
    }
}

fn timestamp() -> String {
    let now = chrono::Local::now();
    now.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/* =========================
   MACROS
   ========================= */

#[macro_export]
macro_rules! debug {
    ($log:expr, $($arg:tt)*) => {{
        $crate::logging::emit(&*$log, $crate::logging::Level::Debug, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! info {
    ($log:expr, $($arg:tt)*) => {{
        $crate::logging::emit(&*$log, $crate::logging::Level::Info, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! warn {
    ($log:expr, $($arg:tt)*) => {{
        $crate::logging::emit(&*$log, $crate::logging::Level::Warn, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! error {
    ($log:expr, $($arg:tt)*) => {{
        $crate::logging::emit(&*$log, $crate::logging::Level::Error, format_args!($($arg)*));
    }};
}

/* =========================
   TEST CAPTURE
   ========================= */

#[cfg(test)]
#[derive(Default)]
pub struct MemoryLog {
    entries: std::sync::Mutex<Vec<(Level, String)>>,
}

#[cfg(test)]
impl MemoryLog {
    pub fn lines(&self) -> Vec<(Level, String)> {
        self.entries.lock().unwrap().clone()
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.lines()
            .iter()
            .any(|(l, msg)| *l == level && msg.contains(needle))
    }
}

#[cfg(test)]
impl LogSink for MemoryLog {
    fn write(&self, level: Level, msg: &str) {
        self.entries.lock().unwrap().push((level, msg.to_string()));
    }
}
