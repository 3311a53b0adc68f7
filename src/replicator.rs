use std::{
    io,
    path::{Path, PathBuf},
    thread,
};

use serde::Serialize;

use crate::{
    asset_fs::AssetFs, display::ResolutionSet, layout::TargetLayout, logging::LogSink,
    ownership::OwnershipElevator,
};
use crate::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Denied,
    Other,
}

pub fn classify(err: &io::Error) -> FailureClass {
    match err.kind() {
        io::ErrorKind::PermissionDenied => FailureClass::Denied,
        _ => FailureClass::Other,
    }
}

/// How many times a denied copy is retried after file-scoped elevation.
/// Never more than one; 0 turns the elevation off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub const CEILING: u32 = 1;

    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.min(Self::CEILING),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Written,
    WrittenAfterElevation,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    Canonical,
    Variant,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplicationReport {
    pub subfolders: usize,
    pub canonical_attempted: usize,
    pub variant_attempted: usize,
    pub written: usize,
    pub written_after_elevation: usize,
    pub failed: Vec<PathBuf>,
}

impl ReplicationReport {
    fn record(&mut self, kind: TargetKind, path: PathBuf, outcome: CopyOutcome) {
        match kind {
            TargetKind::Canonical => self.canonical_attempted += 1,
            TargetKind::Variant => self.variant_attempted += 1,
        }
        match outcome {
            CopyOutcome::Written => self.written += 1,
            CopyOutcome::WrittenAfterElevation => {
                self.written += 1;
                self.written_after_elevation += 1;
            }
            CopyOutcome::Failed => self.failed.push(path),
        }
    }
}

/// Fans one source image out over every subfolder of the lock-screen tree.
pub struct AssetReplicator<'a> {
    fs: &'a dyn AssetFs,
    elevator: &'a OwnershipElevator<'a>,
    layout: &'a TargetLayout,
    retry: RetryPolicy,
    parallel: bool,
    log: &'a dyn LogSink,
}

impl<'a> AssetReplicator<'a> {
    pub fn new(
        fs: &'a dyn AssetFs,
        elevator: &'a OwnershipElevator<'a>,
        layout: &'a TargetLayout,
        log: &'a dyn LogSink,
    ) -> Self {
        Self {
            fs,
            elevator,
            layout,
            retry: RetryPolicy::default(),
            parallel: false,
            log,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = RetryPolicy::new(retry.max_retries);
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Writes the canonical file and one variant per resolution into every
    /// immediate subfolder of `tree_root`. Individual file failures are
    /// logged and reported; only a failed subfolder listing is an error.
    /// Files already written stay in place whatever happens later.
    pub fn replicate(
        &self,
        source: &Path,
        tree_root: &Path,
        resolutions: &ResolutionSet,
    ) -> io::Result<ReplicationReport> {
        let folders = self.fs.subdirectories(tree_root)?;
        info!(
            self.log,
            "[LOCKSCREEN][REPLICATE] {} subfolder(s) under {}: {}",
            folders.len(),
            tree_root.display(),
            folders
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        if resolutions.is_empty() {
            warn!(
                self.log,
                "[LOCKSCREEN][REPLICATE] No display resolutions found; writing canonical files only"
            );
        } else {
            info!(
                self.log,
                "[LOCKSCREEN][REPLICATE] Resolutions: [{}]",
                resolutions.iter().collect::<Vec<_>>().join(", ")
            );
        }

        let per_folder: Vec<Vec<(TargetKind, PathBuf, CopyOutcome)>> = if self.parallel {
            let joined: Vec<_> = thread::scope(|scope| {
                let handles: Vec<_> = folders
                    .iter()
                    .map(|folder| scope.spawn(move || self.replicate_folder(source, folder, resolutions)))
                    .collect();
                handles.into_iter().map(|h| h.join()).collect()
            });
            let panicked = joined.iter().filter(|r| r.is_err()).count();
            if panicked > 0 {
                return Err(io::Error::other(format!(
                    "{panicked} of {} replication worker(s) panicked",
                    joined.len()
                )));
            }
            joined.into_iter().flatten().collect()
        } else {
            folders
                .iter()
                .map(|folder| self.replicate_folder(source, folder, resolutions))
                .collect()
        };

        let mut report = ReplicationReport {
            subfolders: folders.len(),
            ..ReplicationReport::default()
        };
        for (kind, path, outcome) in per_folder.into_iter().flatten() {
            report.record(kind, path, outcome);
        }

        info!(
            self.log,
            "[LOCKSCREEN][REPLICATE] Done: {} written ({} after elevation), {} failed",
            report.written,
            report.written_after_elevation,
            report.failed.len()
        );
        Ok(report)
    }

    fn replicate_folder(
        &self,
        source: &Path,
        folder: &Path,
        resolutions: &ResolutionSet,
    ) -> Vec<(TargetKind, PathBuf, CopyOutcome)> {
        let mut outcomes = Vec::with_capacity(1 + resolutions.len());

        let canonical = folder.join(&self.layout.canonical_name);
        let outcome = self.copy_with_retry(source, &canonical);
        if outcome == CopyOutcome::Failed {
            error!(
                self.log,
                "[LOCKSCREEN][REPLICATE] Could not replace {}; static preview may be stale after sleep",
                canonical.display()
            );
        }
        outcomes.push((TargetKind::Canonical, canonical, outcome));

        for res in resolutions.iter() {
            let variant = folder.join(self.layout.variant_name(res));
            let outcome = self.copy_with_retry(source, &variant);
            outcomes.push((TargetKind::Variant, variant, outcome));
        }

        outcomes
    }

    /// One copy under the uniform policy: denied copies get a file-scoped
    /// elevation and are retried at most once, anything else fails the file
    /// immediately.
    fn copy_with_retry(&self, source: &Path, dest: &Path) -> CopyOutcome {
        let mut retries = 0u32;
        loop {
            info!(self.log, "[LOCKSCREEN][REPLICATE] Copying image to {}", dest.display());
            let err = match self.fs.copy(source, dest) {
                Ok(()) if retries == 0 => return CopyOutcome::Written,
                Ok(()) => {
                    info!(
                        self.log,
                        "[LOCKSCREEN][REPLICATE] Replaced {} after taking ownership",
                        dest.display()
                    );
                    return CopyOutcome::WrittenAfterElevation;
                }
                Err(e) => e,
            };

            if classify(&err) == FailureClass::Other || retries >= self.retry.max_retries {
                error!(
                    self.log,
                    "[LOCKSCREEN][REPLICATE] Failed to copy to {}: {}",
                    dest.display(),
                    err
                );
                return CopyOutcome::Failed;
            }

            warn!(
                self.log,
                "[LOCKSCREEN][REPLICATE] Access denied on {}; taking ownership of the file",
                dest.display()
            );
            if let Err(e) = self.elevator.elevate_file(dest) {
                warn!(
                    self.log,
                    "[LOCKSCREEN][REPLICATE] Failed to grant full control on {}: {}",
                    dest.display(),
                    e
                );
            }
            retries += 1;
        }
    }
}
