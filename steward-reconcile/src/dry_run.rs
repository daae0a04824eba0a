//! Dry-run [`AccountManager`]: renders the `authorized_keys` each user would
//! get and records a unified diff against what is on disk. Nothing is written.

use std::path::{Path, PathBuf};

use similar::TextDiff;
use steward_core::Username;

use crate::accounts::{AccountManager, UserOutcome};
use crate::error::ReconcileError;
use crate::passwd::{lookup_user, under_root};
use crate::system::{is_valid_username, render_authorized_keys};
use crate::writer::read_nofollow;

/// A single `authorized_keys` diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeysDiff {
    pub username: Username,
    pub path: PathBuf,
    /// `true` when the account does not exist yet.
    pub would_create: bool,
    pub unified_diff: String,
}

/// Records the changes a real pass would make.
#[derive(Debug, Default)]
pub struct DryRunAccounts {
    root: PathBuf,
    diffs: Vec<KeysDiff>,
}

impl DryRunAccounts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            diffs: Vec::new(),
        }
    }

    /// Diffs recorded so far, in the order users were processed.
    pub fn diffs(&self) -> &[KeysDiff] {
        &self.diffs
    }

    pub fn into_diffs(self) -> Vec<KeysDiff> {
        self.diffs
    }
}

impl AccountManager for DryRunAccounts {
    fn update_user(
        &mut self,
        username: &Username,
        ssh_keys: &[String],
    ) -> Result<UserOutcome, ReconcileError> {
        let name = username.as_str();
        if !is_valid_username(name) {
            return Ok(UserOutcome::Skipped {
                reason: "invalid username".to_string(),
            });
        }

        let entry = lookup_user(&self.root, name)?;
        if entry.as_ref().is_some_and(|e| e.is_nologin()) {
            return Ok(UserOutcome::Skipped {
                reason: "nologin shell".to_string(),
            });
        }

        let (path, outcome) = match &entry {
            Some(e) => (e.authorized_keys_under(&self.root), UserOutcome::Updated),
            None => (
                under_root(&self.root, Path::new("/home"))
                    .join(name)
                    .join(".ssh/authorized_keys"),
                UserOutcome::Created,
            ),
        };

        let existing = read_nofollow(&path)?.unwrap_or_default();
        let rendered = render_authorized_keys(&existing, ssh_keys);
        if existing.replace("\r\n", "\n") != rendered {
            let display = path.strip_prefix(&self.root).unwrap_or(&path);
            let old_header = format!("a/{}", display.display());
            let new_header = format!("b/{}", display.display());
            let unified = TextDiff::from_lines(&existing, &rendered)
                .unified_diff()
                .header(&old_header, &new_header)
                .context_radius(3)
                .to_string();
            self.diffs.push(KeysDiff {
                username: username.clone(),
                path,
                would_create: entry.is_none(),
                unified_diff: unified,
            });
        }
        Ok(outcome)
    }
}
