//! Side effects that must never fail the request they observe.

use std::future::Future;

use super::metrics;

/// Awaits `fut`, swallowing its error. Failures are logged at `warn` and
/// counted under `best_effort_failures_total{operation}`.
pub async fn best_effort<T, E, F>(operation: &'static str, fut: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(operation, error = %e, "Best-effort operation failed");
            metrics::record_best_effort_failure(operation);
            None
        }
    }
}
