//! Steward: guest environment agent for cloud VM images.
//!
//! # Usage
//!
//! ```text
//! steward accounts [--single-pass] [--interval N] [--force] [--debug]
//! steward accounts --dry-run [--metadata-file PATH]
//! steward addresses [--single-pass] [--debug]
//! steward platform [--root PATH] [--json]
//! steward bundle manifest --output PATH [--not-gce] [--metadata-file PATH]
//! steward bundle plan [--root PATH] [--exclude PATH]... [--manifest PATH] [--json]
//! ```

mod commands;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{
    accounts::AccountsArgs, addresses::AddressesArgs, bundle::BundleCommand,
    platform::PlatformArgs,
};
use steward_core::{config, StewardConfig};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "steward",
    version,
    about = "Reconcile accounts and addresses on a cloud VM, and plan image bundles",
    long_about = None,
)]
struct Cli {
    /// Configuration file (defaults to /etc/steward/steward.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Keep local user accounts and SSH keys in line with metadata.
    Accounts(AccountsArgs),

    /// Keep forwarded IP routes in line with metadata.
    Addresses(AddressesArgs),

    /// Detect the OS platform of a root filesystem.
    Platform(PlatformArgs),

    /// Image bundling helpers.
    Bundle {
        #[command(subcommand)]
        command: BundleCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Accounts(args) => args.run(&config),
        Commands::Addresses(args) => args.run(&config),
        Commands::Platform(args) => args.run(),
        Commands::Bundle { command } => commands::bundle::run(command, &config),
    }
}

fn load_config(path: Option<&Path>) -> Result<StewardConfig> {
    match path {
        Some(path) => config::load_at(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => config::load().context("failed to load default config"),
    }
}
