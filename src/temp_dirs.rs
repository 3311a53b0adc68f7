use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use crate::logging::LogSink;
use crate::{info, warn};

/// Scratch directories for encoder output, all named `{prefix}{token}`
/// under one root so leftovers from a crashed run can be found again.
pub struct TempDirs {
    root: PathBuf,
    prefix: String,
    tracked: Mutex<Vec<PathBuf>>,
    log: Arc<dyn LogSink>,
}

impl TempDirs {
    pub fn new(root: PathBuf, prefix: impl Into<String>, log: Arc<dyn LogSink>) -> Self {
        Self {
            root,
            prefix: prefix.into(),
            tracked: Mutex::new(Vec::new()),
            log,
        }
    }

    pub fn create(&self) -> io::Result<PathBuf> {
        let dir = self
            .root
            .join(format!("{}{}", self.prefix, crate::utility::unique_token()));
        fs::create_dir_all(&dir)?;
        self.tracked
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(dir.clone());
        Ok(dir)
    }

    /// Deletes tracked directories and any prefixed leftovers under the
    /// root. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let tracked: Vec<PathBuf> = self
            .tracked
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();

        let mut removed = 0;
        for dir in tracked.iter().chain(self.orphans().iter()) {
            if !dir.exists() {
                continue;
            }
            match fs::remove_dir_all(dir) {
                Ok(()) => removed += 1,
                Err(e) => warn!(self.log, "[ENCODER][TEMP] Failed to delete {}: {}", dir.display(), e),
            }
        }
        if removed > 0 {
            info!(self.log, "[ENCODER][TEMP] Removed {} temp folder(s)", removed);
        }
        removed
    }

    fn orphans(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .map(|e| e.path())
            .filter(|p| self.is_ours(p))
            .collect()
    }

    fn is_ours(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(&self.prefix))
    }
}
