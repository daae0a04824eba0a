//! Error types for steward-reconcile.

use std::path::PathBuf;

use steward_core::FetchError;
use thiserror::Error;

/// All errors that can arise from a reconciliation pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Desired state could not be fetched. Never handled per item.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// A system command could not be started at all.
    #[error("could not run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A system command ran and exited non-zero.
    #[error("{command} exited with status {status}: {stderr}")]
    Command {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("user {username} does not exist")]
    UnknownUser { username: String },

    /// A managed path is a symlink; it is never followed.
    #[error("refusing to follow symlink at {path}")]
    Symlink { path: PathBuf },

    #[error("not enough free space in {path}: {required} bytes required, {available} available")]
    DiskFull {
        path: PathBuf,
        required: u64,
        available: u64,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`ReconcileError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ReconcileError {
    ReconcileError::Io {
        path: path.into(),
        source,
    }
}
