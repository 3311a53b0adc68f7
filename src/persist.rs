use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde_json::{Map, Value};

use crate::{
    command_runner::{CommandSpec, PrivilegedCommandRunner},
    error::DeployError,
    logging::LogSink,
};
use crate::{info, warn};

pub const PERSONALIZATION_CSP_KEY: &str =
    r"HKEY_LOCAL_MACHINE\SOFTWARE\Microsoft\Windows\CurrentVersion\PersonalizationCSP";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistValue {
    Str(String),
    Dword(u32),
}

/// Durable key/value sink for the stable image location. All entries of
/// one call are written together.
pub trait KeyValueStore: Send + Sync {
    fn set_all(&self, entries: &[(&str, PersistValue)]) -> io::Result<()>;
}

/// Writes values under the PersonalizationCSP policy key. The key lives in
/// HKLM, so the values go through a `.reg` file imported by the elevated
/// runner: one prompt for the whole batch.
pub struct RegistryStore {
    runner: Arc<dyn PrivilegedCommandRunner>,
    scratch_dir: PathBuf,
}

impl RegistryStore {
    pub fn new(runner: Arc<dyn PrivilegedCommandRunner>, scratch_dir: PathBuf) -> Self {
        Self {
            runner,
            scratch_dir,
        }
    }

    pub fn render(entries: &[(&str, PersistValue)]) -> String {
        let mut out = String::from("Windows Registry Editor Version 5.00\r\n\r\n");
        out.push_str(&format!("[{PERSONALIZATION_CSP_KEY}]\r\n"));
        for (name, value) in entries {
            let data = match value {
                PersistValue::Str(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
                PersistValue::Dword(n) => format!("dword:{n:08x}"),
            };
            out.push_str(&format!("\"{name}\"={data}\r\n"));
        }
        out
    }
}

impl KeyValueStore for RegistryStore {
    fn set_all(&self, entries: &[(&str, PersistValue)]) -> io::Result<()> {
        fs::create_dir_all(&self.scratch_dir)?;
        let file = self
            .scratch_dir
            .join(format!("lockscreen_{}.reg", crate::utility::unique_token()));

        // regedit expects UTF-16LE with a BOM for version 5.00 files.
        let mut bytes = vec![0xFF, 0xFE];
        for unit in Self::render(entries).encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        fs::write(&file, bytes)?;

        let command = CommandSpec::new("reg", ["import".to_string(), file.to_string_lossy().into_owned()]);
        let result = match self.runner.run(&command) {
            Ok(Some(0)) => Ok(()),
            Ok(status) => Err(io::Error::other(format!("reg import exited with {status:?}"))),
            Err(e) => Err(io::Error::other(e)),
        };
        let _ = fs::remove_file(&file);
        result
    }
}

/// JSON object on disk, one member per key. Used where there is no
/// registry.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> Map<String, Value> {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|text| serde_json::from_str::<Value>(&text).ok())
            .and_then(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default()
    }
}

impl KeyValueStore for JsonFileStore {
    fn set_all(&self, entries: &[(&str, PersistValue)]) -> io::Result<()> {
        let mut map = self.read();
        for (key, value) in entries {
            let json = match value {
                PersistValue::Str(s) => Value::String(s.clone()),
                PersistValue::Dword(n) => Value::from(*n),
            };
            map.insert(key.to_string(), json);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&Value::Object(map)).map_err(io::Error::other)?;
        fs::write(&self.path, text)
    }
}

/// Keeps a copy of the applied image outside the lock-screen store and
/// records where it lives.
pub struct StablePathPersister {
    stable_dir: PathBuf,
    file_name: String,
    store: Option<Box<dyn KeyValueStore>>,
    log: Arc<dyn LogSink>,
}

impl StablePathPersister {
    pub fn new(
        stable_dir: PathBuf,
        file_name: String,
        store: Option<Box<dyn KeyValueStore>>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            stable_dir,
            file_name,
            store,
            log,
        }
    }

    pub fn stable_path(&self) -> PathBuf {
        self.stable_dir.join(&self.file_name)
    }

    /// Copies `source` to the stable path and records it. The copy must
    /// succeed; store writes are logged on failure and otherwise ignored.
    pub fn persist(&self, source: &Path) -> Result<PathBuf, DeployError> {
        fs::create_dir_all(&self.stable_dir)
            .map_err(|e| DeployError::io("creating stable image folder", &self.stable_dir, e))?;

        let dest = self.stable_path();
        if !same_file(source, &dest) {
            fs::copy(source, &dest)
                .map_err(|e| DeployError::io("copying image to stable location", &dest, e))?;
        }
        info!(self.log, "[LOCKSCREEN][PERSIST] Stable copy at {}", dest.display());

        let Some(store) = &self.store else {
            return Ok(dest);
        };

        let location = dest.to_string_lossy().into_owned();
        let entries = [
            ("LockScreenImagePath", PersistValue::Str(location.clone())),
            ("LockScreenImageUrl", PersistValue::Str(location)),
            ("LockScreenImageStatus", PersistValue::Dword(1)),
        ];
        match store.set_all(&entries) {
            Ok(()) => info!(self.log, "[LOCKSCREEN][PERSIST] Recorded lock screen image location"),
            Err(e) => warn!(self.log, "[LOCKSCREEN][PERSIST] Could not record LockScreenImagePath: {}", e),
        }
        Ok(dest)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        logging::{Level, MemoryLog},
        test_support::FakeRunner,
    };

    #[test]
    fn persist_copies_and_records_all_keys() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("anim.gif");
        fs::write(&source, b"GIF89a").unwrap();
        let store_path = dir.path().join("state.json");

        let persister = StablePathPersister::new(
            dir.path().join("stable"),
            "wallpaper.jpg".into(),
            Some(Box::new(JsonFileStore::new(&store_path))),
            Arc::new(MemoryLog::default()),
        );
        let dest = persister.persist(&source).unwrap();

        assert_eq!(dest, dir.path().join("stable").join("wallpaper.jpg"));
        assert_eq!(fs::read(&dest).unwrap(), b"GIF89a");

        let saved: Value = serde_json::from_str(&fs::read_to_string(store_path).unwrap()).unwrap();
        assert_eq!(saved["LockScreenImagePath"], Value::String(dest.to_string_lossy().into()));
        assert_eq!(saved["LockScreenImageUrl"], saved["LockScreenImagePath"]);
        assert_eq!(saved["LockScreenImageStatus"], Value::from(1));
    }

    #[test]
    fn reapplying_the_stable_copy_keeps_it_intact() {
        let dir = tempfile::tempdir().unwrap();
        let stable = dir.path().join("stable");
        fs::create_dir_all(&stable).unwrap();
        let dest = stable.join("wallpaper.jpg");
        fs::write(&dest, b"GIF89a-body").unwrap();

        let persister = StablePathPersister::new(
            stable,
            "wallpaper.jpg".into(),
            None,
            Arc::new(MemoryLog::default()),
        );
        persister.persist(&dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"GIF89a-body");
    }

    #[test]
    fn missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let persister = StablePathPersister::new(
            dir.path().join("stable"),
            "wallpaper.jpg".into(),
            None,
            Arc::new(MemoryLog::default()),
        );
        let err = persister.persist(&dir.path().join("nope.gif")).unwrap_err();
        assert!(matches!(err, DeployError::Io { .. }));
    }

    #[test]
    fn store_failures_are_logged_not_returned() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("anim.gif");
        fs::write(&source, b"GIF89a").unwrap();
        let log = Arc::new(MemoryLog::default());
        let runner = Arc::new(FakeRunner::with_statuses(vec![Some(1)]));
        let scratch = dir.path().join("scratch");

        let persister = StablePathPersister::new(
            dir.path().join("stable"),
            "wallpaper.jpg".into(),
            Some(Box::new(RegistryStore::new(runner.clone(), scratch.clone()))),
            log.clone(),
        );
        assert!(persister.persist(&source).is_ok());

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "reg");
        assert_eq!(calls[0].args[0], "import");
        assert!(log.contains(Level::Warn, "LockScreenImagePath"));
        assert_eq!(fs::read_dir(scratch).unwrap().count(), 0);
    }

    #[test]
    fn reg_file_escapes_paths_and_formats_dwords() {
        let text = RegistryStore::render(&[
            ("LockScreenImagePath", PersistValue::Str(r"C:\Users\a\wallpaper.jpg".into())),
            ("LockScreenImageStatus", PersistValue::Dword(1)),
        ]);
        assert!(text.starts_with("Windows Registry Editor Version 5.00\r\n"));
        assert!(text.contains(r#""LockScreenImagePath"="C:\\Users\\a\\wallpaper.jpg""#));
        assert!(text.contains("\"LockScreenImageStatus\"=dword:00000001"));
    }

    #[test]
    fn json_store_keeps_existing_members() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        fs::write(&path, r#"{"other": true}"#).unwrap();

        JsonFileStore::new(&path)
            .set_all(&[("LockScreenImageStatus", PersistValue::Dword(1))])
            .unwrap();

        let saved: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(saved["other"], Value::Bool(true));
        assert_eq!(saved["LockScreenImageStatus"], Value::from(1));
    }
}
