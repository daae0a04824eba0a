//! Release-file parsing and platform detection against fixture roots.
//!
//! Each `#[case]` gets an isolated `TempDir`: no shared state.

use std::fs;
use std::path::Path;

use rstest::rstest;
use steward_platform::{
    detect_platform, parse_lsb_release, parse_os_release, parse_redhat_release,
    parse_suse_release, PlatformFamily, PlatformRegistry, ReleaseInfo, SpecialFileKind,
};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

fn make_root() -> TempDir {
    TempDir::new().expect("tempdir")
}

fn write(root: &TempDir, relative: &str, content: &str) {
    let path = root.path().join(relative);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, content).expect("write fixture");
}

fn info(
    codename: Option<&str>,
    description: Option<&str>,
    distribution: Option<&str>,
    version: Option<&str>,
) -> ReleaseInfo {
    ReleaseInfo {
        codename: codename.map(str::to_string),
        description: description.map(str::to_string),
        distribution: distribution.map(str::to_string),
        version: version.map(str::to_string),
    }
}

// ---------------------------------------------------------------------------
// Parsers
// ---------------------------------------------------------------------------

#[rstest]
#[case(
    "CentOS Linux release 7.0.1406 (Core)\n",
    info(Some("Core"), Some("Core"), Some("CentOS"), Some("7.0.1406"))
)]
#[case(
    "CentOS release 6.5 (Final)\n",
    info(Some("Final"), Some("Final"), Some("CentOS"), Some("6.5"))
)]
#[case(
    "Fedora release 20 (Heisenbug)\n",
    info(Some("Heisenbug"), Some("Heisenbug"), Some("Fedora"), Some("20"))
)]
#[case(
    "Red Hat Enterprise Linux Server release 7.2 (Maipo)\n",
    info(Some("Maipo"), Some("Maipo"), Some("Red Hat Enterprise Linux Server"), Some("7.2"))
)]
#[case("", ReleaseInfo::default())]
#[case("CentOS 7 without the usual shape\n", ReleaseInfo::default())]
#[case("\nCentOS release 6.5 (Final)\n", ReleaseInfo::default())]
fn redhat_release_parsing(#[case] text: &str, #[case] expected: ReleaseInfo) {
    assert_eq!(parse_redhat_release(text), expected);
}

#[rstest]
#[case(
    "DISTRIB_ID=Ubuntu\nDISTRIB_RELEASE=14.04\nDISTRIB_CODENAME=trusty\n\
     DISTRIB_DESCRIPTION=\"Ubuntu 14.04.1 LTS\"\n",
    info(Some("trusty"), Some("Ubuntu 14.04.1 LTS"), Some("Ubuntu"), Some("14.04"))
)]
#[case(
    "DISTRIB_ID=GCEL\nDISTRIB_RELEASE=12.04\nDISTRIB_CODENAME=precise\n\
     DISTRIB_DESCRIPTION=GCEL 12.04\n",
    info(Some("precise"), Some("GCEL 12.04"), Some("GCEL"), Some("12.04"))
)]
#[case(
    "DISTRIB_ID=Ubuntu\nDISTRIB_RELEASE=14.04\nDISTRIB_CODENAME=trusty\n",
    ReleaseInfo::default()
)]
#[case("", ReleaseInfo::default())]
fn lsb_release_parsing(#[case] text: &str, #[case] expected: ReleaseInfo) {
    assert_eq!(parse_lsb_release(text), expected);
}

#[test]
fn os_release_parsing() {
    let text =
        "NAME=\"openSUSE\"\nVERSION=\"13.2 (Harlequin)\"\nVERSION_ID=\"13.2\"\nID=opensuse\n";
    assert_eq!(
        parse_os_release(text),
        info(Some("Harlequin"), Some("opensuse"), Some("openSUSE"), Some("13.2"))
    );
    assert!(parse_os_release("").is_empty());
}

#[test]
fn suse_release_parsing() {
    let text = "SUSE Linux Enterprise Server 11 (x86_64)\nVERSION = 11\nPATCHLEVEL = 3\n";
    let parsed = parse_suse_release(text);
    assert_eq!(parsed.distribution.as_deref(), Some("SUSE Linux Enterprise Server"));
    assert_eq!(parsed.version.as_deref(), Some("11"));
    assert!(parsed.codename.is_none());
    assert!(parse_suse_release("").is_empty());
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

#[rstest]
#[case("CentOS Linux release 7.0.1406 (Core)\n", PlatformFamily::CentOs, "xfs")]
#[case("CentOS release 6.5 (Final)\n", PlatformFamily::CentOs, "ext4")]
#[case("Fedora release 20 (Heisenbug)\n", PlatformFamily::Fedora, "ext4")]
#[case("Red Hat Enterprise Linux Server release 7.2 (Maipo)\n", PlatformFamily::Rhel, "xfs")]
#[case("Red Hat Enterprise Linux Server release 6.6 (Santiago)\n", PlatformFamily::Rhel, "ext4")]
fn redhat_family_detection(
    #[case] release: &str,
    #[case] family: PlatformFamily,
    #[case] fs_type: &str,
) {
    let root = make_root();
    write(&root, "etc/redhat-release", release);
    let platform = detect_platform(root.path()).expect("detect");
    assert_eq!(platform.family, family);
    assert_eq!(platform.preferred_filesystem_type(), fs_type);
    assert!(platform.is_linux());
}

#[test]
fn centos_seven_descriptor_fields() {
    let root = make_root();
    write(&root, "etc/redhat-release", "CentOS Linux release 7.0.1406 (Core)\n");
    let platform = detect_platform(root.path()).expect("detect");
    assert_eq!(platform.distribution.as_deref(), Some("CentOS"));
    assert_eq!(platform.distribution_version.as_deref(), Some("7.0.1406"));
    assert_eq!(platform.distribution_codename.as_deref(), Some("Core"));
    assert_eq!(platform.name(), "CentOS (Core)");
}

#[rstest]
#[case("Ubuntu", PlatformFamily::Ubuntu)]
#[case("GCEL", PlatformFamily::Gcel)]
fn lsb_family_detection(#[case] id: &str, #[case] family: PlatformFamily) {
    let root = make_root();
    write(
        &root,
        "etc/lsb-release",
        &format!("DISTRIB_ID={id}\nDISTRIB_RELEASE=14.04\nDISTRIB_CODENAME=trusty\n\
                  DISTRIB_DESCRIPTION=\"{id} 14.04\"\n"),
    );
    // Both derive from Debian and ship its version file.
    write(&root, "etc/debian_version", "jessie/sid\n");
    let platform = detect_platform(root.path()).expect("detect");
    assert_eq!(platform.family, family);
    assert_eq!(platform.preferred_filesystem_type(), "ext4");
}

#[test]
fn lsb_release_missing_a_key_does_not_claim_ubuntu() {
    let root = make_root();
    write(&root, "etc/lsb-release", "DISTRIB_ID=Ubuntu\nDISTRIB_RELEASE=14.04\n");
    let platform = detect_platform(root.path()).expect("detect");
    assert_eq!(platform.family, PlatformFamily::Unknown);
}

#[rstest]
#[case::os_release(
    "etc/os-release",
    "NAME=\"Debian GNU/Linux\"\nVERSION_ID=\"8\"\nVERSION=\"8 (jessie)\"\nID=debian\n"
)]
#[case::debian_version_only("etc/debian_version", "8.2\n")]
fn debian_detection(#[case] file: &str, #[case] content: &str) {
    let root = make_root();
    write(&root, file, content);
    let platform = detect_platform(root.path()).expect("detect");
    assert_eq!(platform.family, PlatformFamily::Debian);
}

#[test]
fn gentoo_detected_by_presence_alone() {
    let root = make_root();
    write(&root, "etc/gentoo-release", "");
    let platform = detect_platform(root.path()).expect("detect");
    assert_eq!(platform.family, PlatformFamily::Gentoo);
    assert_eq!(platform.name(), "Linux");
}

#[rstest]
#[case::sle_os_release(
    "etc/os-release",
    "NAME=\"SUSE Linux Enterprise Server\"\nVERSION=\"12-SP1\"\nVERSION_ID=\"12.1\"\nID=\"sles\"\n",
    PlatformFamily::Sle,
    "ext3"
)]
#[case::sle_legacy(
    "etc/SuSE-release",
    "SUSE Linux Enterprise Server 11 (x86_64)\nVERSION = 11\nPATCHLEVEL = 3\n",
    PlatformFamily::Sle,
    "ext3"
)]
#[case::opensuse(
    "etc/os-release",
    "NAME=openSUSE\nVERSION=\"13.2 (Harlequin)\"\nVERSION_ID=\"13.2\"\nID=opensuse\n",
    PlatformFamily::OpenSuse,
    "ext4"
)]
fn suse_family_detection(
    #[case] file: &str,
    #[case] content: &str,
    #[case] family: PlatformFamily,
    #[case] fs_type: &str,
) {
    let root = make_root();
    write(&root, file, content);
    let platform = detect_platform(root.path()).expect("detect");
    assert_eq!(platform.family, family);
    assert_eq!(platform.preferred_filesystem_type(), fs_type);
}

#[rstest]
#[case::empty_root(None)]
#[case::empty_redhat_release(Some(("etc/redhat-release", "")))]
#[case::malformed_redhat_release(Some(("etc/redhat-release", "garbage\n")))]
#[case::empty_lsb_release(Some(("etc/lsb-release", "")))]
#[case::non_suse_os_release(Some(("etc/os-release", "NAME=Arch\nID=arch\n")))]
fn unknown_when_nothing_matches(#[case] fixture: Option<(&str, &str)>) {
    let root = make_root();
    if let Some((file, content)) = fixture {
        write(&root, file, content);
    }
    let platform = detect_platform(root.path()).expect("detect");
    assert_eq!(platform.family, PlatformFamily::Unknown);
    assert_eq!(platform.preferred_filesystem_type(), "ext4");
    assert!(platform.exclude_list.is_empty());
}

#[test]
fn invalid_utf8_release_file_is_read_lossily() {
    let root = make_root();
    let path = root.path().join("etc/redhat-release");
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, b"CentOS release 6.5 (Fin\xffal)\n").expect("write");
    let platform = detect_platform(root.path()).expect("detect");
    assert_eq!(platform.family, PlatformFamily::CentOs);
}

// ---------------------------------------------------------------------------
// Registry order
// ---------------------------------------------------------------------------

/// A root that both the GCEL and Debian predicates claim.
fn gcel_and_debian_root() -> TempDir {
    let root = make_root();
    write(
        &root,
        "etc/lsb-release",
        "DISTRIB_ID=GCEL\nDISTRIB_RELEASE=12.04\nDISTRIB_CODENAME=precise\n\
         DISTRIB_DESCRIPTION=GCEL\n",
    );
    write(&root, "etc/debian_version", "wheezy/sid\n");
    root
}

#[test]
fn first_registered_match_wins() {
    let root = gcel_and_debian_root();
    let default = PlatformRegistry::default();
    assert_eq!(
        default.candidates(root.path()).expect("candidates"),
        vec![PlatformFamily::Gcel, PlatformFamily::Debian]
    );
    assert_eq!(default.detect(root.path()).expect("detect").family, PlatformFamily::Gcel);

    let reversed = PlatformRegistry::with_order([PlatformFamily::Debian, PlatformFamily::Gcel]);
    assert_eq!(reversed.detect(root.path()).expect("detect").family, PlatformFamily::Debian);
}

#[test]
fn single_match_is_order_independent() {
    let root = make_root();
    write(&root, "etc/gentoo-release", "Gentoo Base System release 2.2\n");
    let mut order = PlatformFamily::DETECTION_ORDER.to_vec();
    let forward = PlatformRegistry::with_order(order.clone());
    order.reverse();
    let backward = PlatformRegistry::with_order(order);
    assert_eq!(forward.detect(root.path()).expect("detect").family, PlatformFamily::Gentoo);
    assert_eq!(backward.detect(root.path()).expect("detect").family, PlatformFamily::Gentoo);
}

#[test]
fn detection_is_deterministic() {
    let root = gcel_and_debian_root();
    let first = detect_platform(root.path()).expect("detect");
    let second = detect_platform(root.path()).expect("detect");
    assert_eq!(first, second);
}

// ---------------------------------------------------------------------------
// Special files
// ---------------------------------------------------------------------------

#[test]
fn special_files_include_selinux_only_when_present() {
    let root = make_root();
    write(&root, "etc/gentoo-release", "");
    let platform = detect_platform(root.path()).expect("detect");

    let without = platform.special_files(root.path());
    let paths: Vec<_> = without.iter().map(|f| f.archive_path.as_str()).collect();
    assert_eq!(paths, ["dev/console", "dev/null", "dev/tty", "dev/zero"]);
    assert_eq!(without[0].mode, 0o600);
    assert_eq!(without[0].kind, SpecialFileKind::CharDevice { major: 5, minor: 1 });

    fs::create_dir(root.path().join("selinux")).expect("mkdir selinux");
    let with = platform.special_files(root.path());
    assert_eq!(with.len(), 5);
    assert_eq!(with[4].kind, SpecialFileKind::Directory);
    assert!(!Path::new(&with[4].archive_path).is_absolute());
}

#[test]
fn descriptor_serializes_filesystem_and_excludes() {
    let root = make_root();
    write(&root, "etc/redhat-release", "CentOS Linux release 7.0.1406 (Core)\n");
    let platform = detect_platform(root.path()).expect("detect");

    let json = serde_json::to_value(&platform).expect("serialize");
    assert_eq!(json["family"], "centos");
    assert_eq!(json["preferred_filesystem_type"], "xfs");
    let excludes = json["exclude_list"].as_array().expect("excludes");
    assert!(excludes
        .iter()
        .any(|e| e["path"] == "/tmp" && e["preserve_dir"] == true));
}
