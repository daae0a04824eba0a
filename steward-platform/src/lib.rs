//! Platform detection for `steward-platform`.
//!
//! `detect_platform(root)` reads the well-known release files under `root`
//! and resolves them to exactly one [`Platform`] descriptor carrying the
//! bundling policy for that OS family: exclude specs, preferred filesystem
//! type, and the special files an image needs.

pub mod error;
pub mod exclude;
pub mod platform;
pub mod release;

pub use error::PlatformError;
pub use exclude::{EntryKind, ExcludeSpec};
pub use platform::{
    detect_host_platform, detect_platform, suse_release, Platform, PlatformFamily,
    PlatformRegistry, SpecialFile, SpecialFileKind,
};
pub use release::{
    major_version, parse_lsb_release, parse_os_release, parse_redhat_release,
    parse_suse_release, ReleaseInfo,
};
