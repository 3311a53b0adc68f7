use std::{io, path::PathBuf};

use thiserror::Error;

/// An elevated (or diagnostic) process could not be started at all.
#[derive(Debug, Error)]
#[error("failed to launch `{program}`: {reason}")]
pub struct LaunchFailure {
    pub program: String,
    pub reason: String,
}

impl LaunchFailure {
    pub fn new(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            reason: reason.into(),
        }
    }
}

/// Failures that abort a whole apply/remove operation. Per-file copy and
/// delete errors never become one of these.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("no lockscreen image selected")]
    NoAsset,

    #[error("current user identity unavailable: {0}")]
    IdentityUnavailable(String),

    #[error("elevation could not be started: {0}")]
    Launch(#[from] LaunchFailure),

    #[error("{context} ({path}): {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl DeployError {
    pub fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("invalid clip range: start {start:.2}s must be before end {end:.2}s")]
    InvalidRange { start: f64, end: f64 },

    #[error("input video not found: {0}")]
    MissingInput(PathBuf),

    #[error("failed to launch encoder `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("encoder exited with status {status:?}: {stderr}")]
    Failed { status: Option<i32>, stderr: String },

    #[error("encoder finished but produced no output at {0}")]
    NoOutput(PathBuf),

    #[error(transparent)]
    Io(#[from] io::Error),
}
