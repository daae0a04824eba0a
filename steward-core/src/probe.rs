//! Instance environment checks.

use std::path::Path;

/// `true` when the DMI BIOS vendor under `root` names Google.
///
/// A missing or unreadable DMI file means "not a target instance"; the
/// bundling tool then skips metadata lookups entirely.
pub fn is_target_instance(root: &Path) -> bool {
    let vendor = root.join("sys/class/dmi/id/bios_vendor");
    std::fs::read_to_string(vendor)
        .map(|v| v.contains("Google"))
        .unwrap_or(false)
}

/// `true` when `path` is a regular file with an execute bit the caller can use.
pub fn is_executable(path: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};

    path.is_file() && access(path, AccessFlags::X_OK).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn dmi_vendor_google_is_target() {
        let root = TempDir::new().expect("root");
        let dmi = root.path().join("sys/class/dmi/id");
        fs::create_dir_all(&dmi).expect("mkdir");
        fs::write(dmi.join("bios_vendor"), "Google\n").expect("write");
        assert!(is_target_instance(root.path()));
    }

    #[test]
    fn missing_dmi_is_not_target() {
        let root = TempDir::new().expect("root");
        assert!(!is_target_instance(root.path()));
    }

    #[test]
    fn executable_requires_file_and_mode() {
        let dir = TempDir::new().expect("dir");
        let script = dir.path().join("first-boot");
        fs::write(&script, "#!/bin/sh\nexit 0\n").expect("write");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o644)).expect("chmod");
        assert!(!is_executable(&script));
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");
        assert!(is_executable(&script));
        assert!(!is_executable(dir.path()));
    }
}
