//! Exclude specifications for image bundling.
//!
//! An [`ExcludeSpec`] drops a path (and everything below it) from the
//! bundle, optionally keeping the directory itself, its immediate files, or
//! its immediate subdirectories so the image boots with the mount points and
//! runtime directories it expects.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// What kind of filesystem entry a candidate path is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Other,
}

impl EntryKind {
    /// Classify `path` on the live filesystem without following symlinks.
    pub fn of(path: &Path) -> Self {
        match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => EntryKind::Dir,
            Ok(meta) if meta.is_file() => EntryKind::File,
            _ => EntryKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludeSpec {
    pub path: PathBuf,
    pub preserve_dir: bool,
    pub preserve_file: bool,
    pub preserve_subdir: bool,
}

impl ExcludeSpec {
    /// Exclude `path` entirely.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            preserve_dir: false,
            preserve_file: false,
            preserve_subdir: false,
        }
    }

    /// Exclude the contents of `path` but keep the directory.
    pub fn keep_dir(path: impl Into<PathBuf>) -> Self {
        Self {
            preserve_dir: true,
            ..Self::new(path)
        }
    }

    /// Build with explicit flags. File and subdirectory preservation only
    /// take effect when the directory itself is preserved.
    pub fn with_flags(
        path: impl Into<PathBuf>,
        preserve_dir: bool,
        preserve_file: bool,
        preserve_subdir: bool,
    ) -> Self {
        Self {
            path: path.into(),
            preserve_dir,
            preserve_file: preserve_file && preserve_dir,
            preserve_subdir: preserve_subdir && preserve_dir,
        }
    }

    /// Whether `candidate` must be left out of the bundle.
    pub fn should_exclude(&self, candidate: &Path, kind: EntryKind) -> bool {
        if !candidate.starts_with(&self.path) {
            return false;
        }
        let preserved = (self.preserve_dir && candidate == self.path)
            || (self.preserve_subdir && kind == EntryKind::Dir)
            || (self.preserve_file && kind == EntryKind::File);
        !preserved
    }

    /// Render this spec as rsync `--exclude-from` filter lines relative to `src`.
    ///
    /// Specs outside `src` render as an empty string. Preserved children are
    /// listed from the live filesystem under `self.path`.
    pub fn rsync_spec(&self, src: &Path) -> String {
        let Ok(rest) = self.path.strip_prefix(src) else {
            return String::new();
        };
        let relative = Path::new("/").join(rest);
        let mut spec = String::new();

        if self.preserve_dir {
            spec.push_str(&format!("+ {}\n", relative.display()));
            if self.preserve_file || self.preserve_subdir {
                let mut children: Vec<_> = std::fs::read_dir(&self.path)
                    .map(|entries| entries.filter_map(|e| e.ok()).collect())
                    .unwrap_or_default();
                children.sort_by_key(|e| e.file_name());
                for child in children {
                    let kind = EntryKind::of(&child.path());
                    let keep = (self.preserve_file && kind == EntryKind::File)
                        || (self.preserve_subdir && kind == EntryKind::Dir);
                    if keep {
                        spec.push_str(&format!(
                            "+ {}\n",
                            relative.join(child.file_name()).display()
                        ));
                    }
                }
            }
        } else {
            spec.push_str(&format!("- {}\n", relative.display()));
        }
        spec.push_str(&format!("- {}\n", relative.join("**").display()));
        spec
    }
}

impl fmt::Display for ExcludeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}:{}:{})",
            self.path.display(),
            u8::from(self.preserve_file),
            u8::from(self.preserve_dir),
            u8::from(self.preserve_subdir)
        )
    }
}
