pub mod accounts;
pub mod addresses;
pub mod bundle;
pub mod platform;

use std::path::Path;
use std::time::Duration;

use steward_core::{FileMetadata, HttpMetadata, MetadataSource, StewardConfig};

/// A recorded metadata snapshot when one is given, the live server otherwise.
pub(crate) fn metadata_source(
    config: &StewardConfig,
    snapshot: Option<&Path>,
) -> Box<dyn MetadataSource> {
    match snapshot {
        Some(path) => Box::new(FileMetadata::new(path)),
        None => Box::new(HttpMetadata::new(
            config.metadata_url.clone(),
            Duration::from_secs(config.metadata_timeout_secs),
        )),
    }
}
