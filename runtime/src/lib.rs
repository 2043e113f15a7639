//! # Racepay Runtime
//!
//! Execution helpers shared by the registration services.
//!
//! ## Core Components
//!
//! - **Retry**: exponential backoff with jitter and retryability predicates
//! - **Periodic tasks**: fixed-interval loops whose passes never overlap
//! - **Health**: component health checks aggregated into a report
//! - **Detached completion**: run a future on its own task so that dropping the
//!   caller does not abandon it halfway
//!
//! ## Example
//!
//! ```ignore
//! use racepay_runtime::complete_detached;
//!
//! // The registration keeps running even if the HTTP client disconnects.
//! let receipt = complete_detached(async move { orchestrator.register_and_pay(request).await })
//!     .await?;
//! ```

use std::future::Future;
use tokio::task::JoinError;

/// Retry logic with exponential backoff
pub mod retry;

/// Non-overlapping periodic tasks
pub mod periodic;

/// Health checks
pub mod health;

pub use health::{HealthCheck, HealthReport, HealthStatus};
pub use periodic::run_periodic;
pub use retry::{RetryError, RetryPolicy};

/// Run `future` to completion on a separate task and wait for its output.
///
/// If the awaiting side is dropped (for example because an HTTP connection
/// closed), the spawned task keeps running until the future finishes.
///
/// # Errors
///
/// Returns [`JoinError`] if the task panicked or the runtime shut down.
pub async fn complete_detached<F>(future: F) -> Result<F::Output, JoinError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn detached_future_survives_a_dropped_caller() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let caller = tokio::spawn(complete_detached(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            flag.store(true, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_secs(1)).await;
        caller.abort();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn detached_future_returns_output() {
        let value = complete_detached(async { 21 * 2 }).await;
        assert_eq!(value.ok(), Some(42));
    }
}
