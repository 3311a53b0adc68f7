//! Fakes shared by the unit tests.

use std::{
    collections::{HashMap, VecDeque},
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use crate::{
    asset_fs::{AssetFs, LocalFs},
    command_runner::{CommandSpec, PrivilegedCommandRunner},
    error::LaunchFailure,
    identity::{Identity, IdentityLookup},
};

/// Ordered record of runner and filesystem calls, shared between fakes so
/// tests can check what happened before what.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Records every command; answers with queued statuses (default `Some(0)`).
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<CommandSpec>>,
    statuses: Mutex<VecDeque<Option<i32>>>,
    fail_launch: bool,
    events: Option<EventLog>,
}

impl FakeRunner {
    pub fn with_statuses(statuses: Vec<Option<i32>>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            ..Self::default()
        }
    }

    pub fn failing_launch() -> Self {
        Self {
            fail_launch: true,
            ..Self::default()
        }
    }

    /// Also appends `run <command line>` to `events`.
    pub fn recording(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

impl PrivilegedCommandRunner for FakeRunner {
    fn run(&self, command: &CommandSpec) -> Result<Option<i32>, LaunchFailure> {
        self.calls.lock().unwrap().push(command.clone());
        if let Some(events) = &self.events {
            events.push(format!("run {}", command.display()));
        }
        if self.fail_launch {
            return Err(LaunchFailure::new(&command.program, "the operation was canceled by the user"));
        }
        Ok(self.statuses.lock().unwrap().pop_front().unwrap_or(Some(0)))
    }
}

/// Per-path behaviour injected into `CountingFs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inject {
    /// Every attempt is denied.
    Denied,
    /// Denied on the first attempt only.
    DeniedOnce,
    /// Fails with a non-permission error.
    Broken,
    /// The call panics.
    Panic,
}

/// Real filesystem underneath, with call counting and injected failures
/// keyed by file name.
#[derive(Default)]
pub struct CountingFs {
    copies: Mutex<Vec<PathBuf>>,
    removals: Mutex<Vec<PathBuf>>,
    inject: Mutex<HashMap<String, Inject>>,
    fail_listing: bool,
    events: Option<EventLog>,
}

impl CountingFs {
    pub fn failing_listing() -> Self {
        Self {
            fail_listing: true,
            ..Self::default()
        }
    }

    /// Also appends `copy <dst>` and `remove <path>` to `events`.
    pub fn recording(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn inject(&self, file_name: &str, behaviour: Inject) {
        self.inject
            .lock()
            .unwrap()
            .insert(file_name.to_string(), behaviour);
    }

    pub fn copies(&self) -> Vec<PathBuf> {
        self.copies.lock().unwrap().clone()
    }

    pub fn removals(&self) -> Vec<PathBuf> {
        self.removals.lock().unwrap().clone()
    }

    fn injected_failure(&self, path: &Path) -> Option<io::Error> {
        let name = path.file_name()?.to_str()?.to_string();
        let behaviour = {
            let mut map = self.inject.lock().unwrap();
            let behaviour = map.get(&name).copied()?;
            if behaviour == Inject::DeniedOnce {
                map.remove(&name);
            }
            behaviour
        };
        match behaviour {
            Inject::Denied | Inject::DeniedOnce => Some(io::Error::from(io::ErrorKind::PermissionDenied)),
            Inject::Broken => Some(io::Error::other("disk on fire")),
            Inject::Panic => panic!("injected panic on {}", path.display()),
        }
    }
}

impl AssetFs for CountingFs {
    fn subdirectories(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        if self.fail_listing {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        LocalFs.subdirectories(root)
    }

    fn find_named(
        &self,
        root: &Path,
        name: &str,
        on_error: &mut dyn FnMut(&Path, &io::Error),
    ) -> Vec<PathBuf> {
        LocalFs.find_named(root, name, on_error)
    }

    fn files_in(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        LocalFs.files_in(dir)
    }

    fn copy(&self, src: &Path, dst: &Path) -> io::Result<()> {
        self.copies.lock().unwrap().push(dst.to_path_buf());
        if let Some(events) = &self.events {
            events.push(format!("copy {}", dst.display()));
        }
        if let Some(e) = self.injected_failure(dst) {
            return Err(e);
        }
        LocalFs.copy(src, dst)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.removals.lock().unwrap().push(path.to_path_buf());
        if let Some(events) = &self.events {
            events.push(format!("remove {}", path.display()));
        }
        if let Some(e) = self.injected_failure(path) {
            return Err(e);
        }
        LocalFs.remove_file(path)
    }
}

pub struct FixedIdentity(pub &'static str);

impl IdentityLookup for FixedIdentity {
    fn lookup(&self) -> Result<Identity, String> {
        Ok(Identity::new(self.0))
    }
}

pub struct NoIdentity;

impl IdentityLookup for NoIdentity {
    fn lookup(&self) -> Result<Identity, String> {
        Err("no interactive user".into())
    }
}
