use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from platform detection.
///
/// Missing or malformed release files are not errors; they make a family's
/// probe decline. Only unexpected I/O failures surface here.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn io_err(path: &Path, source: std::io::Error) -> PlatformError {
    PlatformError::Io {
        path: path.to_path_buf(),
        source,
    }
}
