use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    asset_fs::{AssetFs, LocalFs},
    command_runner::{CapturingRunner, ElevatedRunner, PrivilegedCommandRunner},
    data_loaders::config::AppConfig,
    diagnostics,
    display::{DisplayResolutionSource, FixedResolutions, SystemDisplays},
    error::DeployError,
    identity::{IdentityLookup, IdentityResolver, ProcessTokenLookup},
    layout::TargetLayout,
    logging::LogSink,
    ownership::{ElevationCommands, OwnershipElevator},
    paths,
    persist::{JsonFileStore, KeyValueStore, RegistryStore, StablePathPersister},
    purger::{AssetPurger, DeletionOutcome},
    replicator::{AssetReplicator, ReplicationReport, RetryPolicy},
};
use crate::{error, info};

/* =========================
   STATE
   ========================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyState {
    Idle,
    ResolvingIdentity,
    ElevatingOwnership,
    Replicating,
    Persisting,
    Done,
    Failed,
}

impl fmt::Display for ApplyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::ResolvingIdentity => "ResolvingIdentity",
            Self::ElevatingOwnership => "ElevatingOwnership",
            Self::Replicating => "Replicating",
            Self::Persisting => "Persisting",
            Self::Done => "Done",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

struct Transitions<'a> {
    state: ApplyState,
    log: &'a dyn LogSink,
}

impl<'a> Transitions<'a> {
    fn new(log: &'a dyn LogSink) -> Self {
        Self {
            state: ApplyState::Idle,
            log,
        }
    }

    fn enter(&mut self, next: ApplyState) {
        info!(self.log, "[LOCKSCREEN][STATE] {} -> {}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, err: &DeployError) {
        error!(self.log, "[LOCKSCREEN][STATE] {} -> Failed: {}", self.state, err);
        self.state = ApplyState::Failed;
    }
}

/* =========================
   SERVICE
   ========================= */

#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    pub retry: RetryPolicy,
    pub parallel: bool,
    pub log_file_formats: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            parallel: true,
            log_file_formats: false,
        }
    }
}

/// Everything the service needs from the outside world.
pub struct ServiceParts {
    pub identity: Arc<IdentityResolver>,
    pub runner: Arc<dyn PrivilegedCommandRunner>,
    pub diagnostics: Option<Arc<dyn PrivilegedCommandRunner>>,
    pub fs: Box<dyn AssetFs>,
    pub displays: Box<dyn DisplayResolutionSource>,
    pub persister: StablePathPersister,
    pub layout: TargetLayout,
    pub options: ServiceOptions,
}

/// Deploys the selected image into the OS lock-screen store and removes
/// the resolution variants again. Operations are serialized.
pub struct LockscreenService {
    asset: Mutex<Option<PathBuf>>,
    busy: Mutex<()>,
    parts: ServiceParts,
    log: Arc<dyn LogSink>,
}

impl LockscreenService {
    pub fn new(parts: ServiceParts, log: Arc<dyn LogSink>) -> Self {
        Self {
            asset: Mutex::new(None),
            busy: Mutex::new(()),
            parts,
            log,
        }
    }

    /// Production wiring from the loaded configuration.
    pub fn system(config: &AppConfig, log: Arc<dyn LogSink>) -> Self {
        let settings = &config.settings;

        let lookup: Box<dyn IdentityLookup> = Box::new(ProcessTokenLookup);
        let identity = Arc::new(IdentityResolver::new(lookup, Arc::clone(&log)));
        identity.prefetch();

        let runner: Arc<dyn PrivilegedCommandRunner> = Arc::new(ElevatedRunner);
        let diagnostics: Option<Arc<dyn PrivilegedCommandRunner>> = if settings.elevation.log_acl {
            Some(Arc::new(CapturingRunner::new(Arc::clone(&log))))
        } else {
            None
        };

        let displays: Box<dyn DisplayResolutionSource> = if settings.replication.resolutions.is_empty() {
            Box::new(SystemDisplays)
        } else {
            Box::new(FixedResolutions::parse_list(&settings.replication.resolutions, &*log))
        };

        let store: Option<Box<dyn KeyValueStore>> = match (settings.persistence.registry, cfg!(windows)) {
            (false, _) => None,
            (true, true) => Some(Box::new(RegistryStore::new(Arc::clone(&runner), paths::temp_root()))),
            (true, false) => Some(Box::new(JsonFileStore::new(paths::settings_store_path()))),
        };
        let persister = StablePathPersister::new(
            settings
                .persistence
                .stable_dir
                .clone()
                .unwrap_or_else(paths::default_stable_dir),
            settings.persistence.stable_file_name.clone(),
            store,
            Arc::clone(&log),
        );

        let parts = ServiceParts {
            identity,
            runner,
            diagnostics,
            fs: Box::new(LocalFs),
            displays,
            persister,
            layout: TargetLayout::from_settings(&settings.target),
            options: ServiceOptions {
                retry: RetryPolicy::new(settings.elevation.retry_limit),
                parallel: settings.replication.parallel,
                log_file_formats: settings.diagnostics.log_file_formats,
            },
        };
        Self::new(parts, log)
    }

    pub fn set_current_image(&self, path: Option<PathBuf>) {
        *lock(&self.asset) = path;
    }

    pub fn current_image(&self) -> Option<PathBuf> {
        lock(&self.asset).clone()
    }

    /// Runs the whole apply and reports only success. Details are logged.
    pub fn apply(&self) -> bool {
        self.try_apply().is_ok()
    }

    pub fn try_apply(&self) -> Result<ReplicationReport, DeployError> {
        let _busy = lock(&self.busy);
        let mut transitions = Transitions::new(&*self.log);

        let result = catch_unexpected(|| self.run_apply(&mut transitions));
        match &result {
            Ok(_) => transitions.enter(ApplyState::Done),
            Err(e) => transitions.fail(e),
        }
        result
    }

    /// Deletes every resolution variant below the user's tree. `None` when
    /// the operation could not run at all.
    pub fn remove(&self) -> Option<DeletionOutcome> {
        match self.try_remove() {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(self.log, "[LOCKSCREEN][REMOVE] {}", e);
                None
            }
        }
    }

    pub fn try_remove(&self) -> Result<DeletionOutcome, DeployError> {
        let _busy = lock(&self.busy);
        catch_unexpected(|| {
            let identity = self.parts.identity.resolve()?;
            let root = self.parts.layout.tree_root(&identity);
            let commands = ElevationCommands::new(identity);
            self.elevator(&commands).take_ownership(&root)?;

            let outcome = AssetPurger::new(&*self.parts.fs, &self.parts.layout, &*self.log).purge(&root);
            info!(
                self.log,
                "[LOCKSCREEN][REMOVE] Removed {} of {} variant file(s)",
                outcome.successful,
                outcome.total()
            );
            Ok(outcome)
        })
    }

    fn run_apply(&self, transitions: &mut Transitions<'_>) -> Result<ReplicationReport, DeployError> {
        let source = self.current_image().ok_or(DeployError::NoAsset)?;
        check_source(&source)?;
        info!(self.log, "[LOCKSCREEN][APPLY] Applying {}", source.display());

        transitions.enter(ApplyState::ResolvingIdentity);
        let identity = self.parts.identity.resolve()?;
        let root = self.parts.layout.tree_root(&identity);

        transitions.enter(ApplyState::ElevatingOwnership);
        let commands = ElevationCommands::new(identity);
        let elevator = self.elevator(&commands);
        elevator.take_ownership(&root)?;

        transitions.enter(ApplyState::Replicating);
        let resolutions = self.parts.displays.resolutions();
        let report = AssetReplicator::new(&*self.parts.fs, &elevator, &self.parts.layout, &*self.log)
            .with_retry(self.parts.options.retry)
            .parallel(self.parts.options.parallel)
            .replicate(&source, &root, &resolutions)
            .map_err(|e| DeployError::Unexpected(format!("replicating into {}: {e}", root.display())))?;

        if self.parts.options.log_file_formats {
            diagnostics::log_file_formats(&root, &*self.log);
        }

        transitions.enter(ApplyState::Persisting);
        self.parts.persister.persist(&source)?;

        Ok(report)
    }

    fn elevator<'a>(&'a self, commands: &'a ElevationCommands) -> OwnershipElevator<'a> {
        OwnershipElevator::new(
            &*self.parts.runner,
            self.parts.diagnostics.as_deref(),
            commands,
            &*self.log,
        )
    }
}

fn check_source(source: &Path) -> Result<(), DeployError> {
    match std::fs::metadata(source) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(DeployError::io(
            "lockscreen image is not a file",
            source,
            std::io::Error::from(std::io::ErrorKind::InvalidInput),
        )),
        Err(e) => Err(DeployError::io("reading lockscreen image", source, e)),
    }
}

fn catch_unexpected<T>(f: impl FnOnce() -> Result<T, DeployError>) -> Result<T, DeployError> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string());
        Err(DeployError::Unexpected(msg))
    })
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
