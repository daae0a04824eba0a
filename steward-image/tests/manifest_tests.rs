use std::cell::Cell;
use std::fs;
use std::path::Path;

use rstest::rstest;
use steward_core::{FetchError, FileMetadata, MetadataSource};
use steward_image::{BundlePlan, ImageManifest, ManifestError};
use steward_platform::{PlatformFamily, PlatformRegistry};
use tempfile::TempDir;

/// Serves a fixed `instance/` document and counts requests.
struct StaticInstance {
    body: Result<String, ()>,
    calls: Cell<usize>,
}

impl StaticInstance {
    fn ok(body: &str) -> Self {
        Self {
            body: Ok(body.to_string()),
            calls: Cell::new(0),
        }
    }

    fn unreachable() -> Self {
        Self {
            body: Err(()),
            calls: Cell::new(0),
        }
    }
}

impl MetadataSource for StaticInstance {
    fn get_metadata(&self, path: &str, recursive: bool) -> Result<String, FetchError> {
        self.calls.set(self.calls.get() + 1);
        assert_eq!(path, "instance/");
        assert!(recursive);
        self.body.clone().map_err(|()| FetchError::Transport {
            path: path.to_string(),
            message: "connection refused".to_string(),
        })
    }
}

#[test]
fn writes_manifest_when_licenses_present() {
    let dir = TempDir::new().expect("tempdir");
    let out = dir.path().join("manifest.json");
    let source = StaticInstance::ok(r#"{"id": "123", "licenses": [{"id": "L1"}, {"id": "L2"}]}"#);

    let written = ImageManifest::new(&source, true)
        .create_if_needed(&out)
        .expect("create");

    assert!(written);
    assert_eq!(
        fs::read_to_string(&out).expect("read"),
        r#"{"licenses": ["L1", "L2"]}"#
    );
}

#[rstest]
#[case::empty_list(r#"{"licenses": []}"#)]
#[case::missing_key(r#"{"hostname": "vm-1"}"#)]
fn no_manifest_without_licenses(#[case] body: &str) {
    let dir = TempDir::new().expect("tempdir");
    let out = dir.path().join("manifest.json");
    let source = StaticInstance::ok(body);

    let written = ImageManifest::new(&source, true)
        .create_if_needed(&out)
        .expect("create");

    assert!(!written);
    assert!(!out.exists());
}

#[test]
fn off_platform_never_fetches() {
    let dir = TempDir::new().expect("tempdir");
    let out = dir.path().join("manifest.json");
    let source = StaticInstance::unreachable();

    let written = ImageManifest::new(&source, false)
        .create_if_needed(&out)
        .expect("create");

    assert!(!written);
    assert_eq!(source.calls.get(), 0);
}

#[test]
fn fetch_failure_propagates() {
    let dir = TempDir::new().expect("tempdir");
    let out = dir.path().join("manifest.json");
    let source = StaticInstance::unreachable();

    let err = ImageManifest::new(&source, true)
        .create_if_needed(&out)
        .unwrap_err();

    assert!(matches!(err, ManifestError::Fetch(FetchError::Transport { .. })));
    assert!(!out.exists());
}

#[rstest]
#[case::not_json("<html>oops</html>")]
#[case::license_without_id(r#"{"licenses": [{"name": "L1"}]}"#)]
fn malformed_metadata_propagates(#[case] body: &str) {
    let dir = TempDir::new().expect("tempdir");
    let source = StaticInstance::ok(body);
    let err = ImageManifest::new(&source, true)
        .create_if_needed(&dir.path().join("manifest.json"))
        .unwrap_err();
    assert!(matches!(err, ManifestError::Fetch(FetchError::Json(_))));
}

#[test]
fn file_snapshot_feeds_manifest() {
    let dir = TempDir::new().expect("tempdir");
    let snapshot = dir.path().join("metadata.json");
    fs::write(
        &snapshot,
        r#"{"instance": {"licenses": [{"id": "1000"}]}, "project": {}}"#,
    )
    .expect("write snapshot");

    let manifest = ImageManifest::new(FileMetadata::new(&snapshot), true);
    assert_eq!(manifest.licenses().expect("licenses"), vec!["1000".to_string()]);
}

#[test]
fn bundle_plan_records_written_manifest() {
    let root = TempDir::new().expect("root");
    fs::create_dir_all(root.path().join("etc")).expect("mkdir");
    fs::write(
        root.path().join("etc/redhat-release"),
        "CentOS Linux release 7.0.1406 (Core)\n",
    )
    .expect("write release");
    let out = root.path().join("manifest.json");
    let source = StaticInstance::ok(r#"{"licenses": [{"id": "L1"}]}"#);

    let plan = BundlePlan::build(root.path(), &PlatformRegistry::default(), [])
        .expect("plan")
        .with_manifest(&ImageManifest::new(&source, true), &out)
        .expect("manifest");

    assert_eq!(plan.family, PlatformFamily::CentOs);
    assert_eq!(plan.filesystem_type, "xfs");
    assert_eq!(plan.platform, "CentOS (Core)");
    assert_eq!(plan.manifest.as_deref(), Some(out.as_path()));
    assert!(plan
        .rsync_filter()
        .contains("+ /var/lib/google/per-instance\n"));
}

#[test]
fn bundle_plan_serialises_to_json() {
    let root = TempDir::new().expect("root");
    let plan = BundlePlan::build(root.path(), &PlatformRegistry::default(), []).expect("plan");
    let json = serde_json::to_value(&plan).expect("json");
    assert_eq!(json["family"], "unknown");
    assert_eq!(json["filesystem_type"], "ext4");
    assert!(json["manifest"].is_null());
    assert!(Path::new(json["root"].as_str().expect("root str")).is_absolute());
}
