//! Daemon entry points for the accounts and address managers.
//!
//! Each entry point loads nothing itself: it takes a [`StewardConfig`],
//! builds the live collaborators, and drives reconciliation passes through
//! the [`scheduler`] on a tokio runtime. Passes themselves are blocking and
//! run on the blocking pool.
//!
//! [`StewardConfig`]: steward_core::StewardConfig

mod error;
pub mod first_boot;
mod runtime;
pub mod scheduler;

pub use error::DaemonError;
pub use first_boot::run_first_boot;
pub use runtime::{
    accounts_main, accounts_pass, accounts_pass_with, addresses_main, addresses_pass,
    ensure_not_managed_elsewhere, init_tracing, AccountsOptions, AddressesOptions,
};
pub use scheduler::{run_forever, run_once, LoopStats};
