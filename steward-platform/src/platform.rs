//! Platform descriptors and the ordered detection registry.
//!
//! Every supported OS family is a [`PlatformFamily`] variant. Detection walks
//! [`PlatformRegistry`] in order and the first family whose probe claims the
//! root filesystem wins; nothing matching resolves to
//! [`PlatformFamily::Unknown`].

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::error::{io_err, PlatformError};
use crate::exclude::ExcludeSpec;
use crate::release::{
    parse_lsb_release, parse_os_release, parse_redhat_release, parse_suse_release, ReleaseInfo,
};

const REDHAT_RELEASE: &str = "etc/redhat-release";
const LSB_RELEASE: &str = "etc/lsb-release";
const OS_RELEASE: &str = "etc/os-release";
const SUSE_RELEASE: &str = "etc/SuSE-release";
const GENTOO_RELEASE: &str = "etc/gentoo-release";
const DEBIAN_VERSION: &str = "etc/debian_version";

// ---------------------------------------------------------------------------
// Families
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFamily {
    CentOs,
    Fedora,
    Rhel,
    Gcel,
    Ubuntu,
    Debian,
    Gentoo,
    Sle,
    OpenSuse,
    Unknown,
}

impl PlatformFamily {
    /// Default detection order. SLE precedes openSUSE so the enterprise
    /// prefix wins; GCEL and Ubuntu precede Debian, which they derive from.
    pub const DETECTION_ORDER: [PlatformFamily; 9] = [
        PlatformFamily::CentOs,
        PlatformFamily::Fedora,
        PlatformFamily::Rhel,
        PlatformFamily::Gcel,
        PlatformFamily::Ubuntu,
        PlatformFamily::Debian,
        PlatformFamily::Gentoo,
        PlatformFamily::Sle,
        PlatformFamily::OpenSuse,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PlatformFamily::CentOs => "CentOS",
            PlatformFamily::Fedora => "Fedora",
            PlatformFamily::Rhel => "RHEL",
            PlatformFamily::Gcel => "GCEL",
            PlatformFamily::Ubuntu => "Ubuntu",
            PlatformFamily::Debian => "Debian",
            PlatformFamily::Gentoo => "Gentoo",
            PlatformFamily::Sle => "SLE",
            PlatformFamily::OpenSuse => "openSUSE",
            PlatformFamily::Unknown => "Unknown",
        }
    }

    pub fn is_linux(self) -> bool {
        self != PlatformFamily::Unknown
    }

    /// Run this family's detection predicate against `root`.
    ///
    /// `Ok(Some(info))` means the family claims the root; `info` carries
    /// whatever its release file contributed. Missing, empty or malformed
    /// release files are `Ok(None)`.
    pub fn probe(self, root: &Path) -> Result<Option<ReleaseInfo>, PlatformError> {
        match self {
            PlatformFamily::CentOs => probe_redhat(root, |d| d.eq_ignore_ascii_case("centos")),
            PlatformFamily::Fedora => probe_redhat(root, |d| d.eq_ignore_ascii_case("fedora")),
            PlatformFamily::Rhel => probe_redhat(root, |d| {
                d.to_ascii_lowercase().starts_with("red hat enterprise")
            }),
            PlatformFamily::Gcel => probe_lsb(root, "GCEL"),
            PlatformFamily::Ubuntu => probe_lsb(root, "Ubuntu"),
            PlatformFamily::Debian => probe_debian(root),
            PlatformFamily::Gentoo => Ok(root
                .join(GENTOO_RELEASE)
                .exists()
                .then(ReleaseInfo::default)),
            PlatformFamily::Sle => probe_suse(root, true),
            PlatformFamily::OpenSuse => probe_suse(root, false),
            PlatformFamily::Unknown => Ok(None),
        }
    }

    fn preferred_filesystem_type(self, info: &ReleaseInfo) -> &'static str {
        match self {
            PlatformFamily::CentOs | PlatformFamily::Rhel => {
                if info.major_version().is_some_and(|major| major >= 7) {
                    "xfs"
                } else {
                    "ext4"
                }
            }
            PlatformFamily::Sle => "ext3",
            _ => "ext4",
        }
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Read a release file, treating absence as `None` and invalid UTF-8 lossily.
fn read_release(root: &Path, relative: &str) -> Result<Option<String>, PlatformError> {
    let path = root.join(relative);
    match std::fs::read(&path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(io_err(&path, source)),
    }
}

fn probe_redhat(
    root: &Path,
    vendor: impl Fn(&str) -> bool,
) -> Result<Option<ReleaseInfo>, PlatformError> {
    let Some(text) = read_release(root, REDHAT_RELEASE)? else {
        return Ok(None);
    };
    let info = parse_redhat_release(&text);
    Ok(info
        .distribution
        .as_deref()
        .is_some_and(vendor)
        .then_some(info))
}

fn probe_lsb(root: &Path, distrib_id: &str) -> Result<Option<ReleaseInfo>, PlatformError> {
    let Some(text) = read_release(root, LSB_RELEASE)? else {
        return Ok(None);
    };
    let info = parse_lsb_release(&text);
    Ok((info.distribution.as_deref() == Some(distrib_id)).then_some(info))
}

fn probe_debian(root: &Path) -> Result<Option<ReleaseInfo>, PlatformError> {
    match read_release(root, OS_RELEASE)? {
        Some(text) => {
            let info = parse_os_release(&text);
            Ok((info.description.as_deref() == Some("debian")).then_some(info))
        }
        None => Ok(root
            .join(DEBIAN_VERSION)
            .is_file()
            .then(ReleaseInfo::default)),
    }
}

/// SUSE-specific release probe: os-release when it names SUSE, else the
/// legacy SuSE-release file.
pub fn suse_release(root: &Path) -> Result<ReleaseInfo, PlatformError> {
    if let Some(text) = read_release(root, OS_RELEASE)? {
        let info = parse_os_release(&text);
        let is_suse = info
            .distribution
            .as_deref()
            .is_some_and(|d| d.to_ascii_uppercase().contains("SUSE"));
        if is_suse {
            // ID is an os-release detail, not a SUSE description.
            return Ok(ReleaseInfo {
                description: None,
                ..info
            });
        }
    }
    Ok(read_release(root, SUSE_RELEASE)?
        .map(|text| parse_suse_release(&text))
        .unwrap_or_default())
}

fn probe_suse(root: &Path, enterprise: bool) -> Result<Option<ReleaseInfo>, PlatformError> {
    let info = suse_release(root)?;
    let Some(distribution) = info.distribution.as_deref().filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    let is_sle = distribution.starts_with("SUSE Linux Enterprise");
    Ok((is_sle == enterprise).then_some(info))
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// A device node or directory the bundler must synthesise in the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecialFile {
    /// Path inside the image, relative to its root (`dev/console`).
    pub archive_path: String,
    pub kind: SpecialFileKind,
    pub mode: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum SpecialFileKind {
    CharDevice { major: u32, minor: u32 },
    Directory,
}

/// Resolved policy for one root filesystem. Immutable once detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Platform {
    pub family: PlatformFamily,
    pub distribution: Option<String>,
    pub distribution_version: Option<String>,
    pub distribution_codename: Option<String>,
    pub exclude_list: Vec<ExcludeSpec>,
    pub overwrite_list: Vec<String>,
    #[serde(rename = "preferred_filesystem_type")]
    preferred_filesystem: &'static str,
}

impl Platform {
    /// Build the descriptor for `family` from what its probe parsed.
    pub fn new(family: PlatformFamily, info: ReleaseInfo) -> Self {
        let exclude_list = if family.is_linux() {
            linux_exclude_list()
        } else {
            Vec::new()
        };
        Self {
            family,
            preferred_filesystem: family.preferred_filesystem_type(&info),
            distribution: info.distribution,
            distribution_version: info.version,
            distribution_codename: info.codename,
            exclude_list,
            overwrite_list: Vec::new(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(PlatformFamily::Unknown, ReleaseInfo::default())
    }

    /// Human-readable OS name: `"<distribution> (<codename>)"`,
    /// the bare distribution, `"Linux"`, or `"Unknown"`.
    pub fn name(&self) -> String {
        if !self.family.is_linux() {
            return "Unknown".to_string();
        }
        match (&self.distribution, &self.distribution_codename) {
            (Some(d), Some(c)) if !d.is_empty() && !c.is_empty() => format!("{d} ({c})"),
            (Some(d), _) if !d.is_empty() => d.clone(),
            _ => "Linux".to_string(),
        }
    }

    pub fn is_linux(&self) -> bool {
        self.family.is_linux()
    }

    pub fn is_unix(&self) -> bool {
        false
    }

    pub fn is_windows(&self) -> bool {
        false
    }

    pub fn preferred_filesystem_type(&self) -> &'static str {
        self.preferred_filesystem
    }

    /// Special files the image needs; `selinux` only when `root/selinux` is
    /// a directory.
    pub fn special_files(&self, root: &Path) -> Vec<SpecialFile> {
        if !self.is_linux() {
            return Vec::new();
        }
        let char_dev = |name: &str, major, minor, mode| SpecialFile {
            archive_path: format!("dev/{name}"),
            kind: SpecialFileKind::CharDevice { major, minor },
            mode,
        };
        let mut files = vec![
            char_dev("console", 5, 1, 0o600),
            char_dev("null", 1, 3, 0o666),
            char_dev("tty", 5, 0, 0o666),
            char_dev("zero", 1, 5, 0o666),
        ];
        if root.join("selinux").is_dir() {
            files.push(SpecialFile {
                archive_path: "selinux".to_string(),
                kind: SpecialFileKind::Directory,
                mode: 0o755,
            });
        }
        files
    }
}

fn linux_exclude_list() -> Vec<ExcludeSpec> {
    vec![
        ExcludeSpec::new("/etc/ssh/.host_key_regenerated"),
        ExcludeSpec::keep_dir("/dev"),
        ExcludeSpec::keep_dir("/proc"),
        ExcludeSpec::with_flags("/run", true, false, true),
        ExcludeSpec::new("/selinux"),
        ExcludeSpec::keep_dir("/tmp"),
        ExcludeSpec::keep_dir("/sys"),
        ExcludeSpec::keep_dir("/var/lib/google/per-instance"),
        ExcludeSpec::with_flags("/var/lock", true, false, true),
        ExcludeSpec::with_flags("/var/log", true, false, true),
        ExcludeSpec::with_flags("/var/run", true, false, true),
    ]
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered list of candidate families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformRegistry {
    order: Vec<PlatformFamily>,
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self {
            order: PlatformFamily::DETECTION_ORDER.to_vec(),
        }
    }
}

impl PlatformRegistry {
    /// Registry with a custom order; the first matching family still wins.
    pub fn with_order(order: impl IntoIterator<Item = PlatformFamily>) -> Self {
        Self {
            order: order
                .into_iter()
                .filter(|f| *f != PlatformFamily::Unknown)
                .collect(),
        }
    }

    pub fn order(&self) -> &[PlatformFamily] {
        &self.order
    }

    /// First family in order whose probe claims `root`, else `Unknown`.
    pub fn detect(&self, root: &Path) -> Result<Platform, PlatformError> {
        for family in &self.order {
            if let Some(info) = family.probe(root)? {
                return Ok(Platform::new(*family, info));
            }
        }
        Ok(Platform::unknown())
    }

    /// Every family whose probe claims `root`, in registry order.
    pub fn candidates(&self, root: &Path) -> Result<Vec<PlatformFamily>, PlatformError> {
        let mut matched = Vec::new();
        for family in &self.order {
            if family.probe(root)?.is_some() {
                matched.push(*family);
            }
        }
        Ok(matched)
    }
}

/// Detect the platform of `root` with the default registry.
pub fn detect_platform(root: &Path) -> Result<Platform, PlatformError> {
    PlatformRegistry::default().detect(root)
}

/// `detect_platform` for the running system.
pub fn detect_host_platform() -> Result<Platform, PlatformError> {
    detect_platform(Path::new("/"))
}
