use std::path::Path;

use crate::{
    command_runner::{CommandSpec, PrivilegedCommandRunner},
    error::LaunchFailure,
    identity::Identity,
    logging::LogSink,
};
use crate::{error, info, warn};

/// SID of the well-known "Everyone" principal.
#[cfg(windows)]
pub const EVERYONE_SID: &str = "*S-1-1-0";

/// Builds the platform commands that claim ownership and grant access.
#[derive(Debug, Clone)]
pub struct ElevationCommands {
    #[cfg_attr(windows, allow(dead_code))]
    identity: Identity,
}

impl ElevationCommands {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    #[cfg(windows)]
    pub fn claim_tree(&self, root: &Path) -> CommandSpec {
        CommandSpec::new(
            "takeown",
            ["/f".to_string(), path_arg(root), "/r".into(), "/d".into(), "y".into()],
        )
    }

    #[cfg(windows)]
    pub fn grant_tree(&self, root: &Path) -> CommandSpec {
        let grant = format!("{EVERYONE_SID}:(F)");
        CommandSpec::new("icacls", [path_arg(root), "/grant".into(), grant, "/T".into(), "/C".into()])
    }

    #[cfg(windows)]
    pub fn claim_file(&self, file: &Path) -> CommandSpec {
        CommandSpec::new("takeown", ["/f".to_string(), path_arg(file)])
    }

    #[cfg(windows)]
    pub fn grant_file(&self, file: &Path) -> CommandSpec {
        let grant = format!("{EVERYONE_SID}:F");
        CommandSpec::new("icacls", [path_arg(file), "/grant:r".into(), grant, "/C".into()])
    }

    #[cfg(windows)]
    pub fn list_acl(&self, root: &Path) -> CommandSpec {
        CommandSpec::new("icacls", ["*", "/t"]).in_dir(root)
    }

    #[cfg(not(windows))]
    pub fn claim_tree(&self, root: &Path) -> CommandSpec {
        CommandSpec::new("chown", ["-R".to_string(), self.identity.to_string(), path_arg(root)])
    }

    #[cfg(not(windows))]
    pub fn grant_tree(&self, root: &Path) -> CommandSpec {
        CommandSpec::new("chmod", ["-R".to_string(), "a+rwX".into(), path_arg(root)])
    }

    #[cfg(not(windows))]
    pub fn claim_file(&self, file: &Path) -> CommandSpec {
        CommandSpec::new("chown", [self.identity.to_string(), path_arg(file)])
    }

    #[cfg(not(windows))]
    pub fn grant_file(&self, file: &Path) -> CommandSpec {
        CommandSpec::new("chmod", ["a+rw".to_string(), path_arg(file)])
    }

    #[cfg(not(windows))]
    pub fn list_acl(&self, root: &Path) -> CommandSpec {
        CommandSpec::new("ls", ["-lR".to_string(), path_arg(root)])
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Exit status of the claim and grant steps. Informational only: a
/// non-zero code never stops the operation, later writes decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElevationRecord {
    pub claim: Option<i32>,
    pub grant: Option<i32>,
}

impl ElevationRecord {
    pub fn clean(&self) -> bool {
        self.claim == Some(0) && self.grant == Some(0)
    }
}

pub struct OwnershipElevator<'a> {
    runner: &'a dyn PrivilegedCommandRunner,
    /// Unelevated runner for ACL listings; `None` disables them.
    diagnostics: Option<&'a dyn PrivilegedCommandRunner>,
    commands: &'a ElevationCommands,
    log: &'a dyn LogSink,
}

impl<'a> OwnershipElevator<'a> {
    pub fn new(
        runner: &'a dyn PrivilegedCommandRunner,
        diagnostics: Option<&'a dyn PrivilegedCommandRunner>,
        commands: &'a ElevationCommands,
        log: &'a dyn LogSink,
    ) -> Self {
        Self {
            runner,
            diagnostics,
            commands,
            log,
        }
    }

    /// Recursively claims `root` and grants Everyone full control. The
    /// grant runs even when the claim exits non-zero. Only a launch failure
    /// is an error.
    pub fn take_ownership(&self, root: &Path) -> Result<ElevationRecord, LaunchFailure> {
        info!(self.log, "[LOCKSCREEN][ELEVATE] Taking ownership of {}", root.display());
        self.log_acl(root, "prior to taking ownership");

        let claim = self.run_step(&self.commands.claim_tree(root))?;
        let grant = self.run_step(&self.commands.grant_tree(root))?;
        let record = ElevationRecord { claim, grant };

        if !record.clean() {
            warn!(
                self.log,
                "[LOCKSCREEN][ELEVATE] Elevation of {} finished with claim={:?} grant={:?}; continuing",
                root.display(),
                record.claim,
                record.grant
            );
        }

        self.log_acl(root, "post taking ownership");
        crate::diagnostics::check_write_access(root, self.log);
        Ok(record)
    }

    /// File-scoped variant used when a single copy is denied.
    pub fn elevate_file(&self, file: &Path) -> Result<ElevationRecord, LaunchFailure> {
        let claim = self.run_step(&self.commands.claim_file(file))?;
        let grant = self.run_step(&self.commands.grant_file(file))?;
        info!(
            self.log,
            "[LOCKSCREEN][ELEVATE] Granted full control to Everyone on {} (claim={:?} grant={:?})",
            file.display(),
            claim,
            grant
        );
        Ok(ElevationRecord { claim, grant })
    }

    fn run_step(&self, command: &CommandSpec) -> Result<Option<i32>, LaunchFailure> {
        info!(self.log, "[LOCKSCREEN][ELEVATE] Running elevated `{}`", command.display());
        match self.runner.run(command) {
            Ok(status) => Ok(status),
            Err(e) => {
                error!(self.log, "[LOCKSCREEN][ELEVATE] {}", e);
                Err(e)
            }
        }
    }

    fn log_acl(&self, root: &Path, phase: &str) {
        let Some(runner) = self.diagnostics else {
            return;
        };
        info!(self.log, "[LOCKSCREEN][ACL] Permissions {} for {}", phase, root.display());
        if let Err(e) = runner.run(&self.commands.list_acl(root)) {
            warn!(self.log, "[LOCKSCREEN][ACL] Failed to list permissions: {}", e);
        }
    }
}
