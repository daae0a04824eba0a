//! Steward core library: domain types, configuration, metadata access, and
//! the exclusive-execution guard shared by every daemon.
//!
//! - [`types`]: desired-state newtypes and collections
//! - [`config`]: [`StewardConfig`] YAML loading
//! - [`metadata`]: [`MetadataSource`] and its HTTP / file backends
//! - [`lock`]: [`ExclusiveLock`] and [`run_exclusively`]
//! - [`probe`]: instance environment checks

pub mod config;
pub mod error;
pub mod lock;
pub mod metadata;
pub mod probe;
pub mod types;

pub use config::StewardConfig;
pub use error::{ConfigError, FetchError, LockError};
pub use lock::{run_exclusively, ExclusiveLock, LockMode};
pub use metadata::{FileMetadata, HttpMetadata, MetadataSource};
pub use types::{
    AddressAssignment, DesiredAccount, DesiredAccounts, DesiredAddresses, InterfaceName, Username,
};
