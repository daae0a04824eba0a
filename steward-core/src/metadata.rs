//! Metadata service access.
//!
//! [`MetadataSource`] is the only seam the reconcilers and the manifest
//! builder see. [`HttpMetadata`] talks to the real service; [`FileMetadata`]
//! serves a recursive JSON snapshot from disk for offline runs and tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use crate::error::FetchError;

/// Fetch a metadata document by path.
///
/// `recursive = true` returns the JSON tree rooted at `path`.
pub trait MetadataSource {
    fn get_metadata(&self, path: &str, recursive: bool) -> Result<String, FetchError>;
}

impl<T: MetadataSource + ?Sized> MetadataSource for &T {
    fn get_metadata(&self, path: &str, recursive: bool) -> Result<String, FetchError> {
        (**self).get_metadata(path, recursive)
    }
}

impl<T: MetadataSource + ?Sized> MetadataSource for Box<T> {
    fn get_metadata(&self, path: &str, recursive: bool) -> Result<String, FetchError> {
        (**self).get_metadata(path, recursive)
    }
}

// ---------------------------------------------------------------------------
// HTTP backend
// ---------------------------------------------------------------------------

/// Blocking HTTP client for the metadata service.
pub struct HttpMetadata {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpMetadata {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .redirects(0)
            .build();
        Self { base_url, agent }
    }

    /// Full request URL for `path`.
    pub fn url_for(&self, path: &str, recursive: bool) -> String {
        let path = path.trim_start_matches('/');
        if recursive {
            format!("{}{}?recursive=true&alt=json", self.base_url, path)
        } else {
            format!("{}{}", self.base_url, path)
        }
    }
}

impl MetadataSource for HttpMetadata {
    fn get_metadata(&self, path: &str, recursive: bool) -> Result<String, FetchError> {
        let url = self.url_for(path, recursive);
        let response = self
            .agent
            .get(&url)
            .set("Metadata-Flavor", "Google")
            .call();
        match response {
            Ok(resp) => resp.into_string().map_err(|e| FetchError::Transport {
                path: path.to_string(),
                message: e.to_string(),
            }),
            Err(ureq::Error::Status(404, _)) => Err(FetchError::NotFound {
                path: path.to_string(),
            }),
            Err(ureq::Error::Status(status, _)) => Err(FetchError::Status {
                path: path.to_string(),
                status,
            }),
            Err(ureq::Error::Transport(t)) => Err(FetchError::Transport {
                path: path.to_string(),
                message: t.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// File backend
// ---------------------------------------------------------------------------

/// Serves metadata from a recursive JSON snapshot.
///
/// Path segments use the service's kebab-case spelling
/// (`instance/network-interfaces/0`); the snapshot uses the camelCase keys
/// the service emits for recursive JSON (`networkInterfaces`).
#[derive(Debug, Clone)]
pub struct FileMetadata {
    path: PathBuf,
}

impl FileMetadata {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Value, FetchError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|source| FetchError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl MetadataSource for FileMetadata {
    fn get_metadata(&self, path: &str, recursive: bool) -> Result<String, FetchError> {
        let root = self.load()?;
        let node = lookup(&root, path).ok_or_else(|| FetchError::NotFound {
            path: path.to_string(),
        })?;
        match node {
            Value::String(s) if !recursive => Ok(s.clone()),
            other => Ok(serde_json::to_string(other)?),
        }
    }
}

/// Walk `path` through a recursive metadata document.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        node = match node {
            Value::Object(map) => map
                .get(segment)
                .or_else(|| map.get(&kebab_to_camel(segment)))?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

fn kebab_to_camel(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut upper = false;
    for c in segment.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
