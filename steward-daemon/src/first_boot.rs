//! The one-time first-boot hook run ahead of each accounts pass.

use std::path::Path;

use steward_core::probe::is_executable;
use steward_reconcile::CommandRunner;

/// Run the one-time bootstrap hook at `path` if it is present and executable.
///
/// The hook is expected to be idempotent (it typically regenerates host keys
/// on first boot and does nothing afterwards), so it is invoked before every
/// accounts pass. Its failure is logged and never blocks reconciliation.
/// Returns whether the hook was invoked.
pub fn run_first_boot<R: CommandRunner + ?Sized>(path: &Path, runner: &R) -> bool {
    if !is_executable(path) {
        return false;
    }
    let program = path.to_string_lossy();
    match runner.run(&program, &[]) {
        Ok(output) if output.success() => {
            tracing::debug!(hook = %path.display(), "first-boot hook finished");
        }
        Ok(output) => {
            tracing::warn!(
                hook = %path.display(),
                status = output.status,
                stderr = %output.stderr.trim(),
                "first-boot hook failed"
            );
        }
        Err(err) => {
            tracing::warn!(hook = %path.display(), error = %err, "could not run first-boot hook");
        }
    }
    true
}
