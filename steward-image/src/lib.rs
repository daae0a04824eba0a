//! # steward-image
//!
//! Bundle-time helpers for the image tool: the license manifest written next
//! to the disk image, and the [`BundlePlan`] describing what gets copied.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::time::Duration;
//! use steward_core::HttpMetadata;
//! use steward_image::{BundlePlan, ImageManifest};
//! use steward_platform::PlatformRegistry;
//!
//! fn plan() -> Result<BundlePlan, steward_image::BundleError> {
//!     let metadata = HttpMetadata::new(
//!         steward_core::config::DEFAULT_METADATA_URL,
//!         Duration::from_secs(70),
//!     );
//!     let manifest = ImageManifest::new(metadata, true);
//!     BundlePlan::build(Path::new("/"), &PlatformRegistry::default(), [])?
//!         .with_manifest(&manifest, Path::new("/tmp/manifest.json"))
//! }
//! ```

pub mod bundle;
pub mod error;
pub mod manifest;

pub use bundle::BundlePlan;
pub use error::{BundleError, ManifestError};
pub use manifest::{render_manifest, ImageManifest};
