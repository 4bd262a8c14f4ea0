//! Retry-forever periodic execution.
//!
//! Every maintenance loop is built from [`run_periodic`]. It is the only
//! place where the catch-log-continue policy lives.
//!
//! ```text
//! loop:
//!     sleep(interval)   ── cancelled ──▶ Err(TaskError::Cancelled)
//!     action(token)
//!         Ok            → next iteration
//!         Cancelled     → Err(TaskError::Cancelled)
//!         other error   → warn!(task, error), next iteration
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::maintenance::MaintenanceError;
use crate::observability::metrics;

/// Run `action` every `interval` until `token` is cancelled.
///
/// Iterations never overlap: the next sleep starts only after the previous
/// action has returned. The returned error is always [`TaskError::Cancelled`].
pub async fn run_periodic<F, Fut>(
    name: &str,
    interval: Duration,
    token: CancellationToken,
    mut action: F,
) -> Result<(), TaskError>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<(), MaintenanceError>>,
{
    tracing::info!(task = %name, interval = ?interval, "Maintenance loop starting");

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        match action(token.clone()).await {
            Ok(()) => {
                metrics::record_maintenance_run(name, "ok");
            }
            Err(MaintenanceError::Cancelled) => break,
            Err(_) if token.is_cancelled() => break,
            Err(e) => {
                metrics::record_maintenance_run(name, "error");
                tracing::warn!(task = %name, error = %e, "Maintenance iteration failed, retrying next interval");
            }
        }
    }

    tracing::debug!(task = %name, "Maintenance loop cancelled");
    Err(TaskError::Cancelled)
}
