//! Bundle planning: everything the image writer needs to know about a root
//! filesystem before copying a single byte.

use std::path::{Path, PathBuf};

use serde::Serialize;
use steward_core::MetadataSource;
use steward_platform::{
    EntryKind, ExcludeSpec, Platform, PlatformFamily, PlatformRegistry, SpecialFile,
};

use crate::error::BundleError;
use crate::manifest::ImageManifest;

/// Resolved bundling policy for one root filesystem.
#[derive(Debug, Clone, Serialize)]
pub struct BundlePlan {
    pub root: PathBuf,
    pub platform: String,
    pub family: PlatformFamily,
    pub filesystem_type: String,
    /// Platform excludes re-rooted under `root`, then caller excludes.
    pub excludes: Vec<ExcludeSpec>,
    pub special_files: Vec<SpecialFile>,
    /// Where the manifest was written, if one was needed.
    pub manifest: Option<PathBuf>,
}

impl BundlePlan {
    /// Detect the platform of `root` and resolve its policy.
    pub fn build(
        root: &Path,
        registry: &PlatformRegistry,
        extra_excludes: impl IntoIterator<Item = ExcludeSpec>,
    ) -> Result<Self, BundleError> {
        let platform = registry.detect(root)?;
        Ok(Self::from_platform(root, &platform, extra_excludes))
    }

    pub fn from_platform(
        root: &Path,
        platform: &Platform,
        extra_excludes: impl IntoIterator<Item = ExcludeSpec>,
    ) -> Self {
        let mut excludes: Vec<ExcludeSpec> = platform
            .exclude_list
            .iter()
            .map(|spec| reroot(root, spec))
            .collect();
        excludes.extend(extra_excludes);

        Self {
            root: root.to_path_buf(),
            platform: platform.name(),
            family: platform.family,
            filesystem_type: platform.preferred_filesystem_type().to_string(),
            excludes,
            special_files: platform.special_files(root),
            manifest: None,
        }
    }

    /// Write the license manifest to `path` and record it when written.
    pub fn with_manifest<M: MetadataSource>(
        mut self,
        manifest: &ImageManifest<M>,
        path: &Path,
    ) -> Result<Self, BundleError> {
        if manifest.create_if_needed(path)? {
            self.manifest = Some(path.to_path_buf());
        }
        Ok(self)
    }

    /// Whether `path` (an absolute path under `root`) is left out.
    pub fn should_exclude(&self, path: &Path, kind: EntryKind) -> bool {
        self.excludes.iter().any(|spec| spec.should_exclude(path, kind))
    }

    /// rsync filter rules for every exclude, relative to `root`.
    pub fn rsync_filter(&self) -> String {
        self.excludes
            .iter()
            .map(|spec| spec.rsync_spec(&self.root))
            .collect()
    }
}

fn reroot(root: &Path, spec: &ExcludeSpec) -> ExcludeSpec {
    let relative = spec.path.strip_prefix("/").unwrap_or(&spec.path);
    ExcludeSpec {
        path: root.join(relative),
        ..spec.clone()
    }
}
