//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use racepay_core::store::RegistrationStore;
use racepay_runtime::{HealthCheck, HealthReport};
use std::sync::Arc;

/// Simple health check endpoint (for basic liveness).
///
/// Returns 200 OK to indicate the service is running.
/// This endpoint does NOT check dependencies (database, etc.).
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness: pings the registration store.
///
/// - 200 OK: every check is healthy or degraded
/// - 503 Service Unavailable: the store did not answer
///
/// ```text
/// GET /ready
/// ```
pub async fn readiness(
    State(store): State<Arc<dyn RegistrationStore>>,
) -> (StatusCode, Json<HealthReport>) {
    let check = match store.ping().await {
        Ok(()) => HealthCheck::healthy("store"),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness probe failed");
            HealthCheck::unhealthy("store", e.to_string())
        },
    };

    let report = HealthReport::new(vec![check], Utc::now());
    let status = if report.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use racepay_runtime::HealthStatus;
    use racepay_testing::{FailPoint, InMemoryRegistrationStore};

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_ready_when_store_answers() {
        let store: Arc<dyn RegistrationStore> = Arc::new(InMemoryRegistrationStore::new());

        let (status, Json(report)) = readiness(State(store)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_not_ready_when_store_fails() {
        let memory = Arc::new(InMemoryRegistrationStore::new());
        memory.fail_always(FailPoint::Ping);
        let store: Arc<dyn RegistrationStore> = memory;

        let (status, Json(report)) = readiness(State(store)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }
}
