//! File-backed metadata source tests.

use assert_fs::prelude::*;
use steward_core::{FetchError, FileMetadata, MetadataSource};

fn snapshot(dir: &assert_fs::TempDir) -> FileMetadata {
    let file = dir.child("metadata.json");
    file.write_str(
        r#"{
            "instance": {
                "licenses": [{"id": "L1"}, {"id": "L2"}],
                "attributes": {"ssh-keys": "alice:ssh-rsa AAA alice"},
                "networkInterfaces": [{"forwardedIps": ["10.0.0.5"]}]
            },
            "project": {"attributes": {}}
        }"#,
    )
    .expect("write snapshot");
    FileMetadata::new(file.path())
}

#[test]
fn recursive_fetch_returns_json_subtree() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let source = snapshot(&dir);
    let body = source.get_metadata("instance/", true).expect("fetch");
    let value: serde_json::Value = serde_json::from_str(&body).expect("json");
    assert_eq!(value["licenses"][1]["id"], "L2");
}

#[test]
fn scalar_fetch_returns_raw_string() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let source = snapshot(&dir);
    let body = source
        .get_metadata("instance/attributes/ssh-keys", false)
        .expect("fetch");
    assert_eq!(body, "alice:ssh-rsa AAA alice");
}

#[test]
fn missing_path_is_not_found() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let source = snapshot(&dir);
    let err = source.get_metadata("instance/tags", true).unwrap_err();
    assert!(err.is_not_found(), "got: {err}");
}

#[test]
fn unreadable_snapshot_is_io_error() {
    let source = FileMetadata::new("/nonexistent/steward/metadata.json");
    let err = source.get_metadata("instance/", true).unwrap_err();
    assert!(matches!(err, FetchError::Io { .. }), "got: {err}");
}
