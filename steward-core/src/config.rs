//! YAML configuration for the steward daemons and tools.
//!
//! # API pattern
//!
//! - `load_at(path)`: explicit file; used in tests with `TempDir`
//! - `load()`: reads [`DEFAULT_CONFIG_PATH`], delegates to `load_at`
//!
//! A missing file is not an error: every field has a default matching the
//! well-known locations on a guest image.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/steward/steward.yaml";
pub const DEFAULT_METADATA_URL: &str = "http://169.254.169.254/computeMetadata/v1/";

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StewardConfig {
    /// Base URL of the metadata service, with trailing slash.
    pub metadata_url: String,
    pub metadata_timeout_secs: u64,
    /// Filesystem root for passwd / group / sudoers lookups.
    pub root: PathBuf,
    pub accounts: AccountsConfig,
    pub addresses: AddressesConfig,
}

impl Default for StewardConfig {
    fn default() -> Self {
        Self {
            metadata_url: DEFAULT_METADATA_URL.to_string(),
            metadata_timeout_secs: 70,
            root: PathBuf::from("/"),
            accounts: AccountsConfig::default(),
            addresses: AddressesConfig::default(),
        }
    }
}

/// Settings for the accounts daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    pub lock_path: PathBuf,
    /// Seconds between passes; `-1` means run a single pass.
    pub interval_secs: i64,
    /// One-time bootstrap hook run before reconciling, if executable.
    pub first_boot: PathBuf,
    /// Presence of this file means another account manager owns the host.
    pub gcua_marker: PathBuf,
    /// Supplementary groups for new accounts; missing groups are skipped.
    pub default_groups: Vec<String>,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            lock_path: PathBuf::from("/var/lock/manage-accounts.lock"),
            interval_secs: 60,
            first_boot: PathBuf::from("/usr/share/google/first-boot"),
            gcua_marker: PathBuf::from("/usr/share/google/gcua"),
            default_groups: ["adm", "video", "dip", "plugdev", "sudo"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Settings for the address daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressesConfig {
    pub lock_path: PathBuf,
    pub interval_secs: u64,
    pub default_interface: String,
    /// Routing protocol id stamped on every route we add ("GG").
    pub proto_id: u8,
}

impl Default for AddressesConfig {
    fn default() -> Self {
        Self {
            lock_path: PathBuf::from("/var/lock/google-address-manager.lock"),
            interval_secs: 5,
            default_interface: "eth0".to_string(),
            proto_id: 66,
        }
    }
}

impl AccountsConfig {
    /// `true` when the configured interval requests exactly one pass.
    pub fn single_pass(&self) -> bool {
        self.interval_secs < 0
    }
}

/// Load configuration from `path`, falling back to defaults when absent.
pub fn load_at(path: &Path) -> Result<StewardConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(StewardConfig::default())
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if contents.trim().is_empty() {
        return Ok(StewardConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// `load_at` convenience wrapper for [`DEFAULT_CONFIG_PATH`].
pub fn load() -> Result<StewardConfig, ConfigError> {
    load_at(Path::new(DEFAULT_CONFIG_PATH))
}
