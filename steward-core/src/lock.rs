//! Exclusive-execution guard.
//!
//! An advisory `flock(2)` on a well-known lock file is the only channel the
//! daemons use to coordinate. The lock lives as long as the
//! [`ExclusiveLock`] value: it is released on drop, so every exit path out of
//! [`run_exclusively`] (normal return, `Err`, unwinding panic) releases it.
//! If the process is killed the kernel drops the lock with the descriptor.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use crate::error::LockError;

/// How to behave when another process already holds the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// Return [`LockError::Contended`] immediately.
    #[default]
    FailFast,
    /// Wait until the holder releases it.
    Block,
}

impl LockMode {
    fn flock_arg(self) -> FlockArg {
        match self {
            LockMode::FailFast => FlockArg::LockExclusiveNonblock,
            LockMode::Block => FlockArg::LockExclusive,
        }
    }
}

/// A held exclusive lock on `path`.
pub struct ExclusiveLock {
    path: PathBuf,
    lock: Flock<File>,
}

impl std::fmt::Debug for ExclusiveLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExclusiveLock").field("path", &self.path).finish()
    }
}

impl ExclusiveLock {
    /// Open (creating if needed) and lock `path`.
    pub fn acquire(path: &Path, mode: LockMode) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| LockError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|source| LockError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        match Flock::lock(file, mode.flock_arg()) {
            Ok(lock) => Ok(Self {
                path: path.to_path_buf(),
                lock,
            }),
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => Err(LockError::Contended {
                path: path.to_path_buf(),
            }),
            Err((_, errno)) => Err(LockError::Io {
                path: path.to_path_buf(),
                source: errno.into(),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release explicitly, surfacing unlock errors that `Drop` would ignore.
    pub fn release(self) -> Result<(), LockError> {
        let path = self.path;
        self.lock
            .unlock()
            .map(drop)
            .map_err(|(_, errno)| LockError::Io {
                path,
                source: errno.into(),
            })
    }
}

/// Run `action` while holding the lock on `path`.
///
/// `action` never runs unless the lock was acquired. Its return value is
/// passed through untouched, so an action returning `Result` yields
/// `Result<Result<T, E>, LockError>`.
pub fn run_exclusively<T, F>(path: &Path, mode: LockMode, action: F) -> Result<T, LockError>
where
    F: FnOnce() -> T,
{
    let guard = ExclusiveLock::acquire(path, mode)?;
    let outcome = action();
    drop(guard);
    Ok(outcome)
}
