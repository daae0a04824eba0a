//! Error types for steward-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading the YAML configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed YAML: includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors from the exclusive-execution guard.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process holds the lock and the guard was asked not to wait.
    #[error("lock {path} is held by another process")]
    Contended { path: PathBuf },

    /// The lock file could not be opened or locked.
    #[error("could not lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from fetching desired state or metadata.
///
/// These are never swallowed by the reconciliation core; they surface to the
/// daemon entry point.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The requested metadata path does not exist (HTTP 404 / missing key).
    #[error("metadata not found: {path}")]
    NotFound { path: String },

    #[error("metadata request for {path} failed: {message}")]
    Transport { path: String, message: String },

    #[error("metadata server returned HTTP {status} for {path}")]
    Status { path: String, status: u16 },

    #[error("malformed metadata for {path}: {message}")]
    Malformed { path: String, message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FetchError {
    pub fn malformed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
