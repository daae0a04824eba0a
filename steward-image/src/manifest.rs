//! License manifest bundled alongside the disk image.
//!
//! The manifest is a single JSON object, `{"licenses": ["L1", "L2"]}`, and
//! is only written when at least one license is attached to the instance.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use steward_core::{FetchError, MetadataSource};

use crate::error::ManifestError;

const INSTANCE_PATH: &str = "instance/";

#[derive(Debug, Deserialize)]
struct InstanceDocument {
    #[serde(default)]
    licenses: Vec<LicenseRef>,
}

#[derive(Debug, Deserialize)]
struct LicenseRef {
    id: String,
}

#[derive(Debug, Serialize)]
struct ManifestDocument<'a> {
    licenses: &'a [String],
}

/// Builds the manifest from instance metadata.
pub struct ImageManifest<M> {
    source: M,
    is_target_instance: bool,
}

impl<M: MetadataSource> ImageManifest<M> {
    /// `is_target_instance = false` skips the metadata fetch entirely, so no
    /// manifest is ever written off-platform.
    pub fn new(source: M, is_target_instance: bool) -> Self {
        Self {
            source,
            is_target_instance,
        }
    }

    /// License ids attached to the instance, in metadata order.
    pub fn licenses(&self) -> Result<Vec<String>, ManifestError> {
        if !self.is_target_instance {
            return Ok(Vec::new());
        }
        let body = self.source.get_metadata(INSTANCE_PATH, true)?;
        let doc: InstanceDocument = serde_json::from_str(&body).map_err(FetchError::from)?;
        Ok(doc.licenses.into_iter().map(|l| l.id).collect())
    }

    /// Write the manifest to `path` if there is anything to record.
    ///
    /// Returns `true` iff a file was written. Fetch failures propagate.
    pub fn create_if_needed(&self, path: &Path) -> Result<bool, ManifestError> {
        let licenses = self.licenses()?;
        if licenses.is_empty() {
            return Ok(false);
        }
        let bytes = render_manifest(&licenses)?;
        std::fs::write(path, bytes).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(true)
    }
}

/// Serialise `licenses` as the manifest document.
pub fn render_manifest(licenses: &[String]) -> Result<Vec<u8>, ManifestError> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, ManifestFormatter);
    ManifestDocument { licenses }
        .serialize(&mut ser)
        .map_err(FetchError::from)?;
    Ok(out)
}

/// Single-line JSON with `": "` and `", "` separators.
struct ManifestFormatter;

impl Formatter for ManifestFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}
