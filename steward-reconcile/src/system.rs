//! [`AccountManager`] that mutates the local account database.
//!
//! Creating a user shells out to `useradd`; sudo access and SSH keys are
//! file edits under the configured root. Lookups read `etc/passwd` and
//! `etc/group` under that root.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind};
use std::os::unix::fs::{lchown, DirBuilderExt};
use std::path::{Path, PathBuf};

use steward_core::probe::is_executable;
use steward_core::Username;

use crate::accounts::{AccountManager, UserOutcome};
use crate::command::{args, CommandRunner};
use crate::error::{io_err, ReconcileError};
use crate::passwd::{groups_that_exist, lookup_user, PasswdEntry};
use crate::writer::{atomic_write, atomic_write_as, read_nofollow, Owner};

pub const GOOGLE_KEY_MARKER: &str = "# Added by Google";
const USERADD: &str = "/usr/sbin/useradd";
const VISUDO: &str = "/usr/sbin/visudo";
const RESTORECON: &str = "/sbin/restorecon";

/// Usernames must be `[A-Za-z0-9._-]+` and not start with `-`.
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && !username.starts_with('-')
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Rewrite an `authorized_keys` file: keep every user-managed line, drop
/// each `# Added by Google` marker with the line after it, then append
/// `ssh_keys` each under a fresh marker.
pub fn render_authorized_keys(existing: &str, ssh_keys: &[String]) -> String {
    let lines: Vec<&str> = existing.lines().collect();
    let mut managed = vec![false; lines.len()];
    // A marker on the last line has no key after it and is kept as-is.
    for i in 0..lines.len().saturating_sub(1) {
        if lines[i].starts_with(GOOGLE_KEY_MARKER) {
            managed[i] = true;
            managed[i + 1] = true;
        }
    }

    let mut out = String::new();
    for (line, _) in lines.iter().zip(&managed).filter(|(_, m)| !**m) {
        out.push_str(line);
        out.push('\n');
    }
    for key in ssh_keys {
        out.push_str(GOOGLE_KEY_MARKER);
        out.push('\n');
        out.push_str(key.trim_end_matches('\n'));
        out.push('\n');
    }
    out
}

/// Whether `sudoers` already has an entry starting with `user` and whitespace.
pub fn has_sudoers_entry(sudoers: &str, user: &str) -> bool {
    sudoers.lines().any(|line| {
        line.strip_prefix(user)
            .is_some_and(|rest| rest.starts_with(char::is_whitespace))
    })
}

/// The live system, rooted at `root`.
pub struct SystemAccounts<R> {
    root: PathBuf,
    runner: R,
    default_groups: Vec<String>,
    restorecon: Option<PathBuf>,
    visudo: Option<PathBuf>,
}

impl<R: CommandRunner> SystemAccounts<R> {
    /// `default_groups` is filtered down to the groups that exist under `root`.
    pub fn new(
        root: impl Into<PathBuf>,
        runner: R,
        default_groups: &[String],
    ) -> Result<Self, ReconcileError> {
        let root = root.into();
        let default_groups = groups_that_exist(&root, default_groups)?;
        let present = |p: &str| Some(PathBuf::from(p)).filter(|p| is_executable(p));
        Ok(Self {
            restorecon: present(RESTORECON),
            visudo: present(VISUDO),
            root,
            runner,
            default_groups,
        })
    }

    /// Override the SELinux relabel tool; `None` disables relabelling.
    pub fn with_restorecon(mut self, path: Option<PathBuf>) -> Self {
        self.restorecon = path;
        self
    }

    /// Override the sudoers validator; `None` skips validation.
    pub fn with_visudo(mut self, path: Option<PathBuf>) -> Self {
        self.visudo = path;
        self
    }

    pub fn default_groups(&self) -> &[String] {
        &self.default_groups
    }

    fn user_add(&self, username: &str) -> Result<(), ReconcileError> {
        tracing::info!("creating account {}", username);
        let mut argv = args([username, "-m", "-s", "/bin/bash", "-p", "*"]);
        if !self.default_groups.is_empty() {
            argv.push("-G".to_string());
            argv.push(self.default_groups.join(","));
        }
        self.runner.run(USERADD, &argv)?.check(USERADD, &argv)?;
        Ok(())
    }

    fn set_selinux_context(&self, path: &Path) {
        let Some(restorecon) = &self.restorecon else {
            return;
        };
        let program = restorecon.to_string_lossy();
        let argv = vec![path.to_string_lossy().into_owned()];
        match self.runner.run(&program, &argv).and_then(|o| o.check(&program, &argv)) {
            Ok(_) => {}
            Err(err) => {
                tracing::error!("unable to set SELinux context for {}: {}", path.display(), err)
            }
        }
    }

    // -----------------------------------------------------------------------
    // sudoers
    // -----------------------------------------------------------------------

    /// Grant passwordless sudo. Failures are logged, never fatal for the user.
    fn make_sudoer(&self, user: &str) {
        let sudoers = self.root.join("etc/sudoers");
        if !sudoers.is_file() {
            tracing::info!(
                "did not grant admin access to {}: {} not found",
                user,
                sudoers.display()
            );
            return;
        }
        match fs::read_to_string(&sudoers) {
            Ok(contents) if has_sudoers_entry(&contents, user) => return,
            Ok(_) => {}
            Err(err) => {
                tracing::warn!("could not read {}: {}", sudoers.display(), err);
                return;
            }
        }

        let lock = self.root.join("etc/sudoers.tmp");
        if let Err(err) = OpenOptions::new().write(true).create_new(true).open(&lock) {
            tracing::warn!(
                "did not grant admin access to {}: cannot lock {}: {}",
                user,
                lock.display(),
                err
            );
            return;
        }
        if let Err(err) = self.append_sudoer(&sudoers, user) {
            tracing::warn!("could not grant {} admin access: {}", user, err);
        }
        match fs::remove_file(&lock) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => tracing::warn!("could not remove {}: {}", lock.display(), err),
        }
    }

    fn append_sudoer(&self, sudoers: &Path, user: &str) -> Result<(), ReconcileError> {
        let contents = fs::read_to_string(sudoers).map_err(|e| io_err(sudoers, e))?;
        if has_sudoers_entry(&contents, user) {
            return Ok(());
        }
        let mut updated = String::with_capacity(contents.len() + 32);
        for line in contents.lines() {
            updated.push_str(line);
            updated.push('\n');
        }
        updated.push_str(&format!("{user} ALL=NOPASSWD: ALL\n"));

        if let Some(visudo) = &self.visudo {
            let candidate = sudoers.with_extension("steward.check");
            fs::write(&candidate, &updated).map_err(|e| io_err(&candidate, e))?;
            let program = visudo.to_string_lossy();
            let argv = vec![
                "-c".to_string(),
                "-f".to_string(),
                candidate.to_string_lossy().into_owned(),
            ];
            let checked = self
                .runner
                .run(&program, &argv)
                .and_then(|o| o.check(&program, &argv));
            let _ = fs::remove_file(&candidate);
            checked?;
        }

        atomic_write(sudoers, &updated, 0o440)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // authorized_keys
    // -----------------------------------------------------------------------

    /// Never follows a symlink at `~/.ssh` or `~/.ssh/authorized_keys`: the
    /// user owns both and the write runs as root.
    fn authorize_ssh_keys(
        &self,
        entry: &PasswdEntry,
        ssh_keys: &[String],
    ) -> Result<(), ReconcileError> {
        let home = entry.home_under(&self.root);
        let ssh_dir = home.join(".ssh");
        if !self.is_real_dir(&ssh_dir)? {
            if !self.is_real_dir(&home)? {
                self.ensure_dir(&home, 0o755)?;
                self.chown(&home, entry)?;
            }
            self.ensure_dir(&ssh_dir, 0o700)?;
            self.chown(&ssh_dir, entry)?;
        }

        let keys_file = ssh_dir.join("authorized_keys");
        let existing = read_nofollow(&keys_file)?.unwrap_or_default();
        let owner = Owner {
            uid: entry.uid,
            gid: entry.gid,
        };
        let rendered = render_authorized_keys(&existing, ssh_keys);
        atomic_write_as(&keys_file, &rendered, 0o600, Some(owner))?;
        self.set_selinux_context(&keys_file);
        Ok(())
    }

    /// `false` when `dir` is absent; a symlink or non-directory is an error.
    fn is_real_dir(&self, dir: &Path) -> Result<bool, ReconcileError> {
        match fs::symlink_metadata(dir) {
            Ok(meta) if meta.file_type().is_symlink() => Err(ReconcileError::Symlink {
                path: dir.to_path_buf(),
            }),
            Ok(meta) if meta.is_dir() => Ok(true),
            Ok(_) => Err(io_err(
                dir,
                io::Error::new(ErrorKind::AlreadyExists, "not a directory"),
            )),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_err(dir, err)),
        }
    }

    fn ensure_dir(&self, dir: &Path, mode: u32) -> Result<(), ReconcileError> {
        match fs::DirBuilder::new().recursive(true).mode(mode).create(dir) {
            Ok(()) => {
                self.set_selinux_context(dir);
                Ok(())
            }
            Err(_) if self.is_real_dir(dir)? => Ok(()),
            Err(err) => Err(io_err(dir, err)),
        }
    }

    fn chown(&self, path: &Path, entry: &PasswdEntry) -> Result<(), ReconcileError> {
        lchown(path, Some(entry.uid), Some(entry.gid)).map_err(|e| io_err(path, e))
    }
}

impl<R: CommandRunner> AccountManager for SystemAccounts<R> {
    fn update_user(
        &mut self,
        username: &Username,
        ssh_keys: &[String],
    ) -> Result<UserOutcome, ReconcileError> {
        let name = username.as_str();
        if !is_valid_username(name) {
            tracing::warn!(
                "not creating account for user {}: usernames must comprise characters \
                 [A-Za-z0-9._-] and not start with '-'",
                name
            );
            return Ok(UserOutcome::Skipped {
                reason: "invalid username".to_string(),
            });
        }

        let mut outcome = UserOutcome::Updated;
        let entry = match lookup_user(&self.root, name)? {
            Some(entry) => entry,
            None => {
                self.user_add(name)?;
                outcome = UserOutcome::Created;
                lookup_user(&self.root, name)?.ok_or_else(|| ReconcileError::UnknownUser {
                    username: name.to_string(),
                })?
            }
        };

        if entry.is_nologin() {
            tracing::debug!("not processing account for user {}: login shell is nologin", name);
            return Ok(UserOutcome::Skipped {
                reason: "nologin shell".to_string(),
            });
        }

        if !ssh_keys.is_empty() {
            self.make_sudoer(name);
        }
        self.authorize_ssh_keys(&entry, ssh_keys)?;
        Ok(outcome)
    }
}
