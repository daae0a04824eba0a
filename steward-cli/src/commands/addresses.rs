//! `steward addresses`: run the forwarded IP address manager.

use anyhow::{Context, Result};
use clap::Args;

use steward_core::StewardConfig;
use steward_daemon::{addresses_main, init_tracing, AddressesOptions};

/// Arguments for `steward addresses`.
#[derive(Args, Debug)]
pub struct AddressesArgs {
    /// Run one reconciliation pass and exit.
    #[arg(long)]
    pub single_pass: bool,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long)]
    pub debug: bool,
}

impl AddressesArgs {
    pub fn run(self, config: &StewardConfig) -> Result<()> {
        init_tracing(self.debug);
        let opts = AddressesOptions {
            single_pass: self.single_pass,
        };
        addresses_main(config, &opts).context("address manager stopped with an error")
    }
}
