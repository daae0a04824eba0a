//! Atomic file replacement for managed files (`authorized_keys`, `sudoers`).
//!
//! ## `atomic_write` protocol
//!
//! 1. Normalise line endings to LF.
//! 2. Open the current file without following symlinks; a symlink at the
//!    target is refused. Identical content is skipped (mode and owner are
//!    still corrected on the open handle).
//! 3. Check free space in the target directory.
//! 4. Write to a fresh `O_EXCL` temp file with a random name in the same
//!    directory, then set mode and owner on that handle.
//! 5. Rename over the final path (atomic on POSIX).
//!
//! Targets may live in user-writable directories (`~/.ssh`), so no step
//! resolves a path the user could have replaced with a link.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::fs::{fchown, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::OFlag;

use crate::error::{io_err, ReconcileError};

/// Headroom required beyond the new file's own size.
const SPACE_MARGIN: u64 = 1024 * 1024;

/// Outcome of an individual file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// File was written (content changed or did not previously exist).
    Written { path: PathBuf },
    /// File was skipped: content already matches.
    Unchanged { path: PathBuf },
}

/// Numeric owner applied to a written file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

/// Atomically replace `path` with `content` and set `mode` on it.
pub fn atomic_write(
    path: &Path,
    content: &str,
    mode: u32,
) -> Result<WriteResult, ReconcileError> {
    atomic_write_as(path, content, mode, None)
}

/// [`atomic_write`], also handing the file to `owner` when given.
pub fn atomic_write_as(
    path: &Path,
    content: &str,
    mode: u32,
    owner: Option<Owner>,
) -> Result<WriteResult, ReconcileError> {
    let normalized = content.replace("\r\n", "\n");
    let content = normalized.as_str();

    if let Some((file, existing)) = open_existing(path)? {
        if existing == content {
            apply_attrs(&file, mode, owner).map_err(|e| io_err(path, e))?;
            tracing::debug!("unchanged: {}", path.display());
            return Ok(WriteResult::Unchanged {
                path: path.to_path_buf(),
            });
        }
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_free_space(dir, content.len() as u64 + SPACE_MARGIN)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".steward.tmp")
        .tempfile_in(dir)
        .map_err(|e| io_err(dir, e))?;
    tmp.write_all(content.as_bytes())
        .and_then(|()| apply_attrs(tmp.as_file(), mode, owner))
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| io_err(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| io_err(path, e.error))?;

    tracing::info!("wrote: {}", path.display());
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

/// Read `path` without following a symlink at its final component.
///
/// `None` when the file does not exist. A symlink is
/// [`ReconcileError::Symlink`]; anything but a regular file is an error.
pub fn read_nofollow(path: &Path) -> Result<Option<String>, ReconcileError> {
    Ok(open_existing(path)?.map(|(_, contents)| contents))
}

fn open_existing(path: &Path) -> Result<Option<(File, String)>, ReconcileError> {
    // O_NONBLOCK keeps a planted FIFO from stalling the open.
    let flags = (OFlag::O_NOFOLLOW | OFlag::O_NONBLOCK).bits();
    let mut file = match OpenOptions::new().read(true).custom_flags(flags).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) if err.raw_os_error() == Some(Errno::ELOOP as i32) => {
            return Err(ReconcileError::Symlink {
                path: path.to_path_buf(),
            })
        }
        Err(err) => return Err(io_err(path, err)),
    };

    let meta = file.metadata().map_err(|e| io_err(path, e))?;
    if !meta.is_file() {
        return Err(io_err(
            path,
            io::Error::new(ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    let mut contents = String::new();
    file.read_to_string(&mut contents).map_err(|e| io_err(path, e))?;
    Ok(Some((file, contents)))
}

fn apply_attrs(file: &File, mode: u32, owner: Option<Owner>) -> io::Result<()> {
    file.set_permissions(fs::Permissions::from_mode(mode))?;
    if let Some(owner) = owner {
        fchown(file, Some(owner.uid), Some(owner.gid))?;
    }
    Ok(())
}

fn ensure_free_space(dir: &Path, required: u64) -> Result<(), ReconcileError> {
    let stat = nix::sys::statvfs::statvfs(dir).map_err(|errno| io_err(dir, errno.into()))?;
    #[allow(clippy::unnecessary_cast)]
    let available = stat.blocks_available() as u64 * stat.fragment_size() as u64;
    tracing::debug!(
        "writing into {}: {} bytes required; {} available",
        dir.display(),
        required,
        available
    );
    if available < required {
        return Err(ReconcileError::DiskFull {
            path: dir.to_path_buf(),
            required,
            available,
        });
    }
    Ok(())
}
