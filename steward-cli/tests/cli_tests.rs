use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn steward_cmd(config: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("steward"));
    cmd.arg("--config")
        .arg(config)
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
    fs::write(path, contents).expect("write");
}

/// A config file whose root and lock paths live under `dir`.
fn config_in(dir: &TempDir) -> std::path::PathBuf {
    let root = dir.path().join("root");
    fs::create_dir_all(root.join("etc")).expect("etc");
    let config = dir.path().join("steward.yaml");
    fs::write(
        &config,
        format!(
            "root: {root}\n\
             accounts:\n  \
             lock_path: {dir}/accounts.lock\n  \
             gcua_marker: {dir}/gcua\n  \
             first_boot: {dir}/first-boot\n",
            root = root.display(),
            dir = dir.path().display()
        ),
    )
    .expect("config");
    config
}

// ---------------------------------------------------------------------------
// platform
// ---------------------------------------------------------------------------

#[test]
fn platform_json_describes_centos_root() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_in(&dir);
    let root = dir.path().join("root");
    write(&root, "etc/redhat-release", "CentOS Linux release 7.0.1406 (Core)\n");

    let output = steward_cmd(&config)
        .args(["platform", "--json", "--root"])
        .arg(&root)
        .output()
        .expect("run steward platform");
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(json["family"], "centos");
    assert_eq!(json["distribution"], "CentOS");
    assert_eq!(json["preferred_filesystem_type"], "xfs");
}

#[test]
fn platform_table_names_the_distribution() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_in(&dir);
    let root = dir.path().join("root");
    write(&root, "etc/redhat-release", "CentOS Linux release 7.0.1406 (Core)\n");

    steward_cmd(&config)
        .args(["platform", "--root"])
        .arg(&root)
        .assert()
        .success()
        .stdout(contains("CentOS (Core)"))
        .stdout(contains("xfs"))
        .stdout(contains("/var/log"));
}

#[test]
fn platform_of_bare_root_is_unknown() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_in(&dir);
    let empty = TempDir::new().expect("empty root");

    steward_cmd(&config)
        .args(["platform", "--root"])
        .arg(empty.path())
        .assert()
        .success()
        .stdout(contains("Unknown"))
        .stdout(contains("No bundle excludes."));
}

// ---------------------------------------------------------------------------
// bundle
// ---------------------------------------------------------------------------

#[test]
fn bundle_manifest_lists_instance_licenses() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_in(&dir);
    let snapshot = dir.path().join("metadata.json");
    fs::write(
        &snapshot,
        r#"{"instance": {"licenses": [{"id": "1000"}, {"id": "2000"}]}}"#,
    )
    .expect("snapshot");
    let output = dir.path().join("manifest.json");

    steward_cmd(&config)
        .args(["bundle", "manifest", "--output"])
        .arg(&output)
        .arg("--metadata-file")
        .arg(&snapshot)
        .assert()
        .success()
        .stdout(contains("wrote"));

    assert_eq!(
        fs::read_to_string(&output).expect("manifest"),
        r#"{"licenses": ["1000", "2000"]}"#
    );
}

#[test]
fn bundle_manifest_off_platform_writes_nothing() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_in(&dir);
    let snapshot = dir.path().join("metadata.json");
    fs::write(&snapshot, r#"{"instance": {"licenses": [{"id": "1000"}]}}"#).expect("snapshot");
    let output = dir.path().join("manifest.json");

    steward_cmd(&config)
        .args(["bundle", "manifest", "--not-gce", "--output"])
        .arg(&output)
        .arg("--metadata-file")
        .arg(&snapshot)
        .assert()
        .success()
        .stdout(contains("not written"));

    assert!(!output.exists());
}

#[test]
fn bundle_manifest_fails_loudly_on_unreadable_metadata() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_in(&dir);
    let output = dir.path().join("manifest.json");

    steward_cmd(&config)
        .args(["bundle", "manifest", "--output"])
        .arg(&output)
        .arg("--metadata-file")
        .arg(dir.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(contains("failed to create manifest"));

    assert!(!output.exists());
}

#[test]
fn bundle_plan_json_reroots_platform_excludes() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_in(&dir);
    let root = dir.path().join("root");
    write(&root, "etc/redhat-release", "CentOS Linux release 7.0.1406 (Core)\n");

    let output = steward_cmd(&config)
        .args(["bundle", "plan", "--json", "--exclude", "/srv/cache", "--root"])
        .arg(&root)
        .output()
        .expect("run steward bundle plan");
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(json["filesystem_type"], "xfs");
    let excludes = json["excludes"].as_array().expect("excludes");
    let tmp = root.join("tmp").display().to_string();
    assert!(excludes.iter().any(|e| e["path"] == tmp.as_str()));
    assert_eq!(excludes.last().expect("last")["path"], "/srv/cache");
    assert!(json["manifest"].is_null());
}

#[test]
fn bundle_plan_rsync_filter_keeps_tmp_but_not_its_contents() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_in(&dir);
    let root = dir.path().join("root");
    write(&root, "etc/redhat-release", "CentOS Linux release 7.0.1406 (Core)\n");

    steward_cmd(&config)
        .args(["bundle", "plan", "--rsync-filter", "--root"])
        .arg(&root)
        .assert()
        .success()
        .stdout(contains("+ /tmp\n- /tmp/**\n"))
        .stdout(contains("- /etc/ssh/.host_key_regenerated\n"));
}

// ---------------------------------------------------------------------------
// accounts
// ---------------------------------------------------------------------------

#[test]
fn accounts_dry_run_previews_new_user_keys() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_in(&dir);
    let snapshot = dir.path().join("metadata.json");
    fs::write(
        &snapshot,
        r#"{
            "instance": {"attributes": {}},
            "project": {"attributes": {"ssh-keys": "alice:ssh-rsa AAAA alice@host"}}
        }"#,
    )
    .expect("snapshot");

    steward_cmd(&config)
        .args(["accounts", "--dry-run", "--metadata-file"])
        .arg(&snapshot)
        .assert()
        .success()
        .stdout(contains("would create"))
        .stdout(contains("alice"))
        .stdout(contains("+ssh-rsa AAAA alice@host"))
        .stdout(contains("1 created"));

    assert!(!dir.path().join("root/home/alice").exists());
}

#[test]
fn accounts_dry_run_with_nothing_to_do() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_in(&dir);
    let snapshot = dir.path().join("metadata.json");
    fs::write(&snapshot, r#"{"instance": {"attributes": {}}, "project": {"attributes": {}}}"#)
        .expect("snapshot");

    steward_cmd(&config)
        .args(["accounts", "--dry-run", "--metadata-file"])
        .arg(&snapshot)
        .assert()
        .success()
        .stdout(contains("No changes."));
}

#[test]
fn accounts_refuse_when_managed_elsewhere() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_in(&dir);
    fs::write(dir.path().join("gcua"), "").expect("marker");

    steward_cmd(&config)
        .args(["accounts", "--single-pass"])
        .assert()
        .failure()
        .stderr(contains("accounts manager stopped with an error"));
}

#[test]
fn metadata_file_requires_dry_run() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_in(&dir);

    steward_cmd(&config)
        .args(["accounts", "--metadata-file", "snapshot.json"])
        .assert()
        .failure()
        .stderr(contains("--dry-run").and(contains("required")));
}

#[test]
fn malformed_config_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    let config = dir.path().join("steward.yaml");
    fs::write(&config, "accounts: [not, a, map]\n").expect("config");

    steward_cmd(&config)
        .args(["platform"])
        .assert()
        .failure()
        .stderr(contains("failed to load config"));
}
