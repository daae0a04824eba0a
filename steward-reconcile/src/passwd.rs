//! Read-only views of `/etc/passwd` and `/etc/group` under a filesystem root.
//!
//! Reading the files directly (instead of `getpwnam`) keeps every lookup
//! relative to the configured root, so tests run against a temp directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use steward_core::Username;

use crate::error::{io_err, ReconcileError};

pub const NOLOGIN_SHELL: &str = "/sbin/nologin";

/// One `/etc/passwd` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    /// Home directory as recorded, i.e. relative to the filesystem root.
    pub home: PathBuf,
    pub shell: String,
}

impl PasswdEntry {
    fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 7 || fields[0].is_empty() {
            return None;
        }
        Some(Self {
            name: fields[0].to_string(),
            uid: fields[2].parse().ok()?,
            gid: fields[3].parse().ok()?,
            home: PathBuf::from(fields[5]),
            shell: fields[6].to_string(),
        })
    }

    pub fn is_nologin(&self) -> bool {
        self.shell == NOLOGIN_SHELL
    }

    /// Home directory resolved under `root`.
    pub fn home_under(&self, root: &Path) -> PathBuf {
        under_root(root, &self.home)
    }

    pub fn authorized_keys_under(&self, root: &Path) -> PathBuf {
        self.home_under(root).join(".ssh").join("authorized_keys")
    }
}

/// `root.join(path)` without the absolute `path` replacing `root`.
pub fn under_root(root: &Path, path: &Path) -> PathBuf {
    root.join(path.strip_prefix("/").unwrap_or(path))
}

fn read_or_empty(path: &Path) -> Result<String, ReconcileError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(io_err(path, err)),
    }
}

/// All well-formed entries of `root/etc/passwd`; comment and broken lines
/// are ignored.
pub fn read_passwd(root: &Path) -> Result<Vec<PasswdEntry>, ReconcileError> {
    let contents = read_or_empty(&root.join("etc/passwd"))?;
    Ok(contents
        .lines()
        .filter(|l| !l.starts_with('#'))
        .filter_map(PasswdEntry::parse)
        .collect())
}

pub fn lookup_user(root: &Path, name: &str) -> Result<Option<PasswdEntry>, ReconcileError> {
    Ok(read_passwd(root)?.into_iter().find(|e| e.name == name))
}

/// The subset of `groups` defined in `root/etc/group`, in input order.
pub fn groups_that_exist(root: &Path, groups: &[String]) -> Result<Vec<String>, ReconcileError> {
    let contents = read_or_empty(&root.join("etc/group"))?;
    let defined: Vec<&str> = contents
        .lines()
        .filter_map(|l| l.split(':').next())
        .filter(|name| !name.is_empty())
        .collect();
    Ok(groups
        .iter()
        .filter(|g| defined.contains(&g.as_str()))
        .cloned()
        .collect())
}

/// Users with an `authorized_keys` file, in passwd order.
pub fn users_with_authorized_keys(root: &Path) -> Result<Vec<Username>, ReconcileError> {
    Ok(read_passwd(root)?
        .into_iter()
        .filter(|e| e.authorized_keys_under(root).is_file())
        .map(|e| Username::from(e.name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const PASSWD: &str = "\
root:x:0:0:root:/root:/bin/bash
# comment
broken-line
daemon:x:1:1:daemon:/usr/sbin:/sbin/nologin
alice:x:1001:1001::/home/alice:/bin/bash
";

    fn root_with_passwd() -> TempDir {
        let root = TempDir::new().expect("root");
        fs::create_dir_all(root.path().join("etc")).expect("etc");
        fs::write(root.path().join("etc/passwd"), PASSWD).expect("passwd");
        root
    }

    #[test]
    fn parses_entries_and_skips_junk() {
        let root = root_with_passwd();
        let entries = read_passwd(root.path()).expect("passwd");
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["root", "daemon", "alice"]);
        assert!(entries[1].is_nologin());
        assert_eq!(entries[2].uid, 1001);
    }

    #[test]
    fn home_is_resolved_under_root() {
        let root = root_with_passwd();
        let alice = lookup_user(root.path(), "alice").expect("read").expect("alice");
        assert_eq!(alice.home_under(root.path()), root.path().join("home/alice"));
        assert!(lookup_user(root.path(), "bob").expect("read").is_none());
    }

    #[test]
    fn missing_passwd_is_empty() {
        let root = TempDir::new().expect("root");
        assert!(read_passwd(root.path()).expect("read").is_empty());
    }

    #[test]
    fn only_existing_groups_are_kept() {
        let root = root_with_passwd();
        fs::write(root.path().join("etc/group"), "adm:x:4:\nsudo:x:27:\n").expect("group");
        let wanted = ["adm", "video", "sudo"].map(String::from).to_vec();
        assert_eq!(
            groups_that_exist(root.path(), &wanted).expect("groups"),
            ["adm", "sudo"]
        );
    }

    #[test]
    fn finds_users_with_authorized_keys() {
        let root = root_with_passwd();
        let ssh = root.path().join("home/alice/.ssh");
        fs::create_dir_all(&ssh).expect("ssh dir");
        fs::write(ssh.join("authorized_keys"), "ssh-rsa AAA\n").expect("keys");
        assert_eq!(
            users_with_authorized_keys(root.path()).expect("users"),
            vec![Username::from("alice")]
        );
    }
}
