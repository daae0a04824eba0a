//! # steward-reconcile
//!
//! Desired-state reconciliation for local accounts and forwarded addresses.
//!
//! - [`accounts`]: [`create_accounts`] / [`update_accounts`] over an
//!   [`AccountsSource`] and an [`AccountManager`]
//! - [`system`]: [`SystemAccounts`], the live `useradd` / sudoers /
//!   `authorized_keys` implementation
//! - [`dry_run`]: [`DryRunAccounts`], which only records diffs
//! - [`addresses`]: [`sync_addresses`] over an [`AddressConfigurator`]
//!   such as [`IpRoute`]
//! - [`writer`]: atomic replacement of managed files

pub mod accounts;
pub mod addresses;
pub mod command;
pub mod dry_run;
pub mod error;
pub mod passwd;
pub mod system;
pub mod writer;

pub use accounts::{
    create_accounts, update_accounts, AccountManager, AccountsReport, AccountsSource,
    MetadataAccountsSource, UserOutcome,
};
pub use addresses::{
    diff_addresses, sync_addresses, AddressConfigurator, AddressDiff, AddressReport,
    AddressSource, IpRoute, MetadataAddressSource,
};
pub use command::{CommandOutput, CommandRunner, SystemCommands};
pub use dry_run::{DryRunAccounts, KeysDiff};
pub use error::ReconcileError;
pub use passwd::users_with_authorized_keys;
pub use system::SystemAccounts;
pub use writer::{atomic_write, atomic_write_as, read_nofollow, Owner, WriteResult};
