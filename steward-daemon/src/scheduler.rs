//! Reconciliation loop driver.
//!
//! A pass is any future resolving to `Result`. [`run_forever`] runs passes
//! back to back with a fixed sleep in between until the `watch` stop signal
//! flips to `true` (or its sender is dropped). A failing pass is logged and
//! the loop carries on; the next pass retries from scratch.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

/// Counters for one [`run_forever`] invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub passes: u64,
    pub failures: u64,
}

/// Run `pass` until `stop` is raised, sleeping `interval` between passes.
///
/// The stop signal is checked before every pass and interrupts the sleep,
/// but never a pass that is already running.
pub async fn run_forever<F, Fut, T, E>(
    label: &str,
    mut pass: F,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> LoopStats
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut stats = LoopStats::default();
    tracing::info!(
        task = label,
        interval_secs = interval.as_secs(),
        "starting reconciliation loop"
    );

    loop {
        if *stop.borrow_and_update() {
            break;
        }

        stats.passes += 1;
        if let Err(err) = pass().await {
            stats.failures += 1;
            tracing::error!(task = label, error = %err, "reconciliation pass failed");
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop.changed() => {
                // A dropped sender can never raise the flag again.
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!(
        task = label,
        passes = stats.passes,
        failures = stats.failures,
        "reconciliation loop stopped"
    );
    stats
}

/// Run exactly one pass, logging a failure before handing it back.
pub async fn run_once<F, Fut, T, E>(label: &str, pass: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let result = pass().await;
    if let Err(err) = &result {
        tracing::error!(task = label, error = %err, "reconciliation pass failed");
    }
    result
}
