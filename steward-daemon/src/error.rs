use std::path::PathBuf;

use steward_core::{ConfigError, FetchError, LockError};
use steward_reconcile::ReconcileError;
use thiserror::Error;

/// Error surface for the daemon entry points.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("could not fetch desired state: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Another account manager owns this host.
    #[error("Google Compute User Accounts is installed ({marker} exists); use --force to override")]
    ManagedElsewhere { marker: PathBuf },

    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
