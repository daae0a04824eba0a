//! `steward accounts`: run the accounts manager, or preview one pass.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use steward_core::StewardConfig;
use steward_daemon::{accounts_main, init_tracing, AccountsOptions};
use steward_reconcile::{
    update_accounts, users_with_authorized_keys, DryRunAccounts, KeysDiff, MetadataAccountsSource,
};

use super::metadata_source;

/// Arguments for `steward accounts`.
#[derive(Args, Debug)]
pub struct AccountsArgs {
    /// Run one reconciliation pass and exit.
    #[arg(long)]
    pub single_pass: bool,

    /// Seconds between passes; a negative value runs a single pass.
    #[arg(long, allow_negative_numbers = true, value_name = "SECONDS")]
    pub interval: Option<i64>,

    /// Run even when another account manager owns this host.
    #[arg(long)]
    pub force: bool,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long)]
    pub debug: bool,

    /// Print the `authorized_keys` changes one pass would make; write nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Read desired accounts from a recursive metadata JSON snapshot.
    #[arg(long, requires = "dry_run", value_name = "PATH")]
    pub metadata_file: Option<PathBuf>,
}

impl AccountsArgs {
    pub fn run(self, config: &StewardConfig) -> Result<()> {
        init_tracing(self.debug);
        if self.dry_run {
            return preview(config, self.metadata_file.as_deref());
        }

        let opts = AccountsOptions {
            single_pass: self.single_pass,
            interval_secs: self.interval,
            force: self.force,
        };
        accounts_main(config, &opts).context("accounts manager stopped with an error")
    }
}

fn preview(config: &StewardConfig, snapshot: Option<&Path>) -> Result<()> {
    let source = MetadataAccountsSource::new(metadata_source(config, snapshot));
    let sshable = users_with_authorized_keys(&config.root)
        .with_context(|| format!("failed to read accounts under {}", config.root.display()))?;

    let mut dry_run = DryRunAccounts::new(&config.root);
    let report = update_accounts(&source, &mut dry_run, &sshable)
        .context("failed to fetch desired accounts")?;

    let diffs = dry_run.into_diffs();
    if diffs.is_empty() {
        println!("{} No changes.", "[dry-run]".dimmed());
    }
    for diff in &diffs {
        print_diff(&config.root, diff);
    }
    println!("{} {report}", "[dry-run]".dimmed());
    Ok(())
}

fn print_diff(root: &Path, diff: &KeysDiff) {
    let action = if diff.would_create { "create" } else { "update" };
    let shown = diff.path.strip_prefix(root).unwrap_or(&diff.path);
    println!(
        "{} would {action} {} ({})",
        "[dry-run]".dimmed(),
        diff.username.as_str().bold(),
        shown.display()
    );
    for line in diff.unified_diff.lines() {
        if line.starts_with('+') && !line.starts_with("+++") {
            println!("{}", line.green());
        } else if line.starts_with('-') && !line.starts_with("---") {
            println!("{}", line.red());
        } else {
            println!("{line}");
        }
    }
}
