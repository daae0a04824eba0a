//! Error types for steward-image.

use std::path::PathBuf;

use steward_core::FetchError;
use steward_platform::PlatformError;
use thiserror::Error;

/// Errors from building or writing the image manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The metadata service was unreachable or returned a document without
    /// the expected shape. Never swallowed: bundling must abort.
    #[error("failed to fetch license metadata: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to write manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from assembling a bundle plan.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}
