//! Daemon entry points for the accounts and address managers.

use std::path::Path;
use std::time::Duration;

use steward_core::{
    run_exclusively, ExclusiveLock, HttpMetadata, LockMode, MetadataSource, StewardConfig,
};
use steward_reconcile::{
    sync_addresses, update_accounts, users_with_authorized_keys, AccountsReport, AddressReport,
    CommandRunner, IpRoute, MetadataAccountsSource, MetadataAddressSource, SystemAccounts,
    SystemCommands,
};
use tokio::sync::watch;

use crate::error::{io_err, DaemonError};
use crate::first_boot::run_first_boot;
use crate::scheduler::{run_forever, run_once};

/// Flags for [`accounts_main`].
#[derive(Debug, Clone, Default)]
pub struct AccountsOptions {
    pub single_pass: bool,
    /// Overrides `accounts.interval_secs`; `-1` requests a single pass.
    pub interval_secs: Option<i64>,
    /// Run even when another account manager owns the host.
    pub force: bool,
}

/// Flags for [`addresses_main`].
#[derive(Debug, Clone, Default)]
pub struct AddressesOptions {
    pub single_pass: bool,
}

/// Install the fmt subscriber on stderr. `RUST_LOG` wins over `debug`.
pub fn init_tracing(debug: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Accounts daemon entry point; blocks until the loop stops.
pub fn accounts_main(config: &StewardConfig, opts: &AccountsOptions) -> Result<(), DaemonError> {
    ensure_not_managed_elsewhere(&config.accounts.gcua_marker, opts.force)?;

    let interval_secs = opts.interval_secs.unwrap_or(config.accounts.interval_secs);
    let single_pass = opts.single_pass || interval_secs < 0;
    let interval = Duration::from_secs(interval_secs.max(0) as u64);

    block_on(async move {
        let config = config.clone();
        if single_pass {
            let report =
                run_once("accounts", || blocking("accounts", move || accounts_pass(&config)))
                    .await?;
            tracing::info!(%report, "accounts pass finished");
            return Ok::<(), DaemonError>(());
        }
        let stop = spawn_stop_listener()?;
        run_forever(
            "accounts",
            || {
                let config = config.clone();
                blocking("accounts", move || accounts_pass(&config))
            },
            interval,
            stop,
        )
        .await;
        Ok(())
    })
}

/// Refuse to run when the Google Compute User Accounts marker is present.
pub fn ensure_not_managed_elsewhere(marker: &Path, force: bool) -> Result<(), DaemonError> {
    if !force && marker.is_file() {
        return Err(DaemonError::ManagedElsewhere {
            marker: marker.to_path_buf(),
        });
    }
    Ok(())
}

/// One accounts pass against the live metadata service and system tools.
pub fn accounts_pass(config: &StewardConfig) -> Result<AccountsReport, DaemonError> {
    accounts_pass_with(config, http_metadata(config), &SystemCommands)
}

/// Run the first-boot hook, then reconcile accounts under the accounts lock.
pub fn accounts_pass_with<M, R>(
    config: &StewardConfig,
    metadata: M,
    runner: &R,
) -> Result<AccountsReport, DaemonError>
where
    M: MetadataSource,
    R: CommandRunner,
{
    run_first_boot(&config.accounts.first_boot, runner);

    let pass = || -> Result<_, DaemonError> {
        let source = MetadataAccountsSource::new(metadata);
        let groups = &config.accounts.default_groups;
        let mut manager = SystemAccounts::new(&config.root, runner, groups)?;
        let sshable = users_with_authorized_keys(&config.root)?;
        Ok(update_accounts(&source, &mut manager, &sshable)?)
    };
    run_exclusively(&config.accounts.lock_path, LockMode::FailFast, pass)?
}

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// Address daemon entry point: holds the address lock for the whole run.
pub fn addresses_main(config: &StewardConfig, opts: &AddressesOptions) -> Result<(), DaemonError> {
    let lock = ExclusiveLock::acquire(&config.addresses.lock_path, LockMode::FailFast)?;
    tracing::info!(lock = %lock.path().display(), "starting address manager");

    let interval = Duration::from_secs(config.addresses.interval_secs);
    let single_pass = opts.single_pass;
    let outcome = block_on(async move {
        let config = config.clone();
        if single_pass {
            let report =
                run_once("addresses", || blocking("addresses", move || addresses_pass(&config)))
                    .await?;
            tracing::info!(%report, "addresses pass finished");
            return Ok::<(), DaemonError>(());
        }
        let stop = spawn_stop_listener()?;
        run_forever(
            "addresses",
            || {
                let config = config.clone();
                blocking("addresses", move || addresses_pass(&config))
            },
            interval,
            stop,
        )
        .await;
        Ok(())
    });

    drop(lock);
    outcome
}

/// One addresses pass against the live metadata service and `ip`.
pub fn addresses_pass(config: &StewardConfig) -> Result<AddressReport, DaemonError> {
    let source = MetadataAddressSource::new(
        http_metadata(config),
        config.addresses.default_interface.as_str(),
    );
    let mut ip_route = IpRoute::new(SystemCommands, config.addresses.proto_id);
    Ok(sync_addresses(&source, &mut ip_route)?)
}

// ---------------------------------------------------------------------------
// Plumbing
// ---------------------------------------------------------------------------

fn http_metadata(config: &StewardConfig) -> HttpMetadata {
    HttpMetadata::new(
        config.metadata_url.clone(),
        Duration::from_secs(config.metadata_timeout_secs),
    )
}

fn block_on<F>(future: F) -> Result<(), DaemonError>
where
    F: std::future::Future<Output = Result<(), DaemonError>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(future)
}

/// Run a blocking pass on the blocking pool.
async fn blocking<T, F>(task: &'static str, pass: F) -> Result<T, DaemonError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DaemonError> + Send + 'static,
{
    tokio::task::spawn_blocking(pass)
        .await
        .map_err(|err| DaemonError::Join {
            task,
            message: err.to_string(),
        })?
}

/// Raise the returned stop flag on Ctrl-C or SIGTERM.
fn spawn_stop_listener() -> Result<watch::Receiver<bool>, DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM handler", e))?;
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    tracing::error!(error = %err, "ctrl-c handler failed");
                }
                tracing::info!("received ctrl-c, stopping after the current pass");
            }
            _ = terminate.recv() => {
                tracing::info!("received SIGTERM, stopping after the current pass");
            }
        }
        let _ = stop_tx.send(true);
        // Keep the sender alive so the loop sees `true`, not a dropped channel.
        stop_tx.closed().await;
    });
    Ok(stop_rx)
}
