use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{asset_fs::AssetFs, layout::TargetLayout, logging::LogSink};
use crate::{error, info, warn};

/// Tally of a purge. Both counters are always present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeletionOutcome {
    pub successful: u32,
    pub failed: u32,
}

impl DeletionOutcome {
    pub fn total(&self) -> u32 {
        self.successful + self.failed
    }
}

/// Deletes the resolution-qualified variants that sit next to any
/// canonical lock-screen file below a tree root.
pub struct AssetPurger<'a> {
    fs: &'a dyn AssetFs,
    layout: &'a TargetLayout,
    log: &'a dyn LogSink,
}

impl<'a> AssetPurger<'a> {
    pub fn new(fs: &'a dyn AssetFs, layout: &'a TargetLayout, log: &'a dyn LogSink) -> Self {
        Self { fs, layout, log }
    }

    /// Never fails. Unreadable directories and undeletable files are logged
    /// and counted (files) or skipped (directories).
    pub fn purge(&self, tree_root: &Path) -> DeletionOutcome {
        let mut outcome = DeletionOutcome::default();

        let canonical = self.fs.find_named(tree_root, &self.layout.canonical_name, &mut |dir, e| {
            warn!(self.log, "[LOCKSCREEN][PURGE] Skipping unreadable {}: {}", dir.display(), e);
        });

        let folders: BTreeSet<PathBuf> = canonical
            .iter()
            .filter_map(|file| file.parent().map(Path::to_path_buf))
            .collect();
        info!(
            self.log,
            "[LOCKSCREEN][PURGE] {} folder(s) hold {} under {}",
            folders.len(),
            self.layout.canonical_name,
            tree_root.display()
        );

        for folder in &folders {
            let files = match self.fs.files_in(folder) {
                Ok(files) => files,
                Err(e) => {
                    warn!(self.log, "[LOCKSCREEN][PURGE] Cannot list {}: {}", folder.display(), e);
                    continue;
                }
            };

            for file in files.iter().filter(|f| self.is_variant(f)) {
                match self.fs.remove_file(file) {
                    Ok(()) => {
                        info!(self.log, "[LOCKSCREEN][PURGE] Deleted {}", file.display());
                        outcome.successful += 1;
                    }
                    Err(e) => {
                        error!(self.log, "[LOCKSCREEN][PURGE] Failed to delete {}: {}", file.display(), e);
                        outcome.failed += 1;
                    }
                }
            }
        }

        info!(
            self.log,
            "[LOCKSCREEN][PURGE] Deleted {} file(s), {} failure(s)",
            outcome.successful,
            outcome.failed
        );
        outcome
    }

    fn is_variant(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| self.layout.is_variant_name(n))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{
        logging::{Level, MemoryLog},
        test_support::{CountingFs, Inject},
    };

    fn layout() -> TargetLayout {
        TargetLayout {
            system_data_root: PathBuf::new(),
            subpath: "ReadOnly".into(),
            canonical_name: "LockScreen.jpg".into(),
            variant_suffix: "_notdimmed.jpg".into(),
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn three_variants_two_failing() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("LockScreen_A");
        touch(&folder.join("LockScreen.jpg"));
        for res in ["1920_1080", "2560_1440", "3840_2160"] {
            touch(&folder.join(format!("LockScreen___{res}_notdimmed.jpg")));
        }

        let fs_ = CountingFs::default();
        fs_.inject("LockScreen___2560_1440_notdimmed.jpg", Inject::Denied);
        fs_.inject("LockScreen___3840_2160_notdimmed.jpg", Inject::Broken);
        let log = MemoryLog::default();
        let layout = layout();

        let outcome = AssetPurger::new(&fs_, &layout, &log).purge(dir.path());

        assert_eq!(outcome, DeletionOutcome { successful: 1, failed: 2 });
        assert_eq!(outcome.total(), 3);
        assert!(folder.join("LockScreen.jpg").exists());
        assert!(!folder.join("LockScreen___1920_1080_notdimmed.jpg").exists());
        assert!(log.contains(Level::Error, "Failed to delete"));
    }

    #[test]
    fn finds_canonical_at_any_depth_and_ignores_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("a").join("b");
        touch(&deep.join("lockscreen.JPG"));
        touch(&deep.join("X___1_1_NOTDIMMED.jpg"));
        touch(&deep.join("keep.jpg"));
        // No canonical file beside this one, so it is left alone.
        let orphan = dir.path().join("c").join("LockScreen___1920_1080_notdimmed.jpg");
        touch(&orphan);

        let fs_ = CountingFs::default();
        let log = MemoryLog::default();
        let layout = layout();

        let outcome = AssetPurger::new(&fs_, &layout, &log).purge(dir.path());

        assert_eq!(outcome, DeletionOutcome { successful: 1, failed: 0 });
        assert!(orphan.exists());
        assert!(deep.join("keep.jpg").exists());
        assert_eq!(fs_.removals(), vec![deep.join("X___1_1_NOTDIMMED.jpg")]);
    }

    #[test]
    fn bare_suffix_file_counts_as_a_variant() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("LockScreen_A");
        touch(&folder.join("LockScreen.jpg"));
        touch(&folder.join("_notdimmed.jpg"));

        let fs_ = CountingFs::default();
        let log = MemoryLog::default();
        let layout = layout();

        let outcome = AssetPurger::new(&fs_, &layout, &log).purge(dir.path());

        assert_eq!(outcome, DeletionOutcome { successful: 1, failed: 0 });
        assert!(!folder.join("_notdimmed.jpg").exists());
        assert!(folder.join("LockScreen.jpg").exists());
    }

    #[test]
    fn missing_root_yields_zero_counts() {
        let dir = tempfile::tempdir().unwrap();
        let fs_ = CountingFs::default();
        let log = MemoryLog::default();
        let layout = layout();

        let outcome = AssetPurger::new(&fs_, &layout, &log).purge(&dir.path().join("gone"));
        assert_eq!(outcome, DeletionOutcome::default());
    }

    #[test]
    fn outcome_serializes_both_counters() {
        let json = serde_json::to_string(&DeletionOutcome { successful: 4, failed: 0 }).unwrap();
        assert_eq!(json, r#"{"successful":4,"failed":0}"#);
    }
}
