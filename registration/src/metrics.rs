//! Business metrics for the registration service.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `racepay_registrations_total{status}` - Registrations by final status
//! - `racepay_gateway_attempts_total{outcome}` - Gateway calls by classified outcome
//! - `racepay_holds_total{result}` - Hold requests by result (held, insufficient)
//! - `racepay_sweeper_expired_total` - Groups expired by the sweeper
//! - `racepay_notifications_total{status}` - Confirmations by delivery status
//! - `racepay_store_conflicts_total{kind}` - Unique-constraint conflicts in the store
//!
//! ## Histograms
//! - `racepay_gateway_duration_seconds` - Latency of a single gateway call

use axum::{Router, extract::State, routing::get};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use racepay_core::types::{AttemptOutcome, PaymentStatus};
use std::time::Duration;

/// Register all metric descriptions.
///
/// Call once at startup, after the recorder is installed.
pub fn register_business_metrics() {
    describe_counter!(
        "racepay_registrations_total",
        "Registrations by resulting status (confirmed, rejected, expired)"
    );
    describe_counter!(
        "racepay_gateway_attempts_total",
        "Gateway calls by classified outcome"
    );
    describe_counter!(
        "racepay_holds_total",
        "Inventory hold requests by result (held, insufficient)"
    );
    describe_counter!(
        "racepay_sweeper_expired_total",
        "Groups expired by the reservation sweeper"
    );
    describe_counter!(
        "racepay_notifications_total",
        "Confirmation messages by status (sent, failed, deferred, resent)"
    );
    describe_counter!(
        "racepay_store_conflicts_total",
        "Unique-constraint conflicts detected by the store"
    );
    describe_histogram!(
        "racepay_gateway_duration_seconds",
        "Time taken by a single gateway call"
    );

    tracing::info!("Business metrics registered");
}

/// Install the Prometheus recorder.
///
/// # Errors
///
/// Returns [`BuildError`] if a recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 30.0],
        )?
        .install_recorder()?;
    register_business_metrics();
    Ok(handle)
}

/// Router serving `GET /metrics` in Prometheus text format.
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(render))
        .with_state(handle)
}

#[allow(clippy::unused_async)]
async fn render(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a group reaching a terminal status.
pub fn record_registration(status: PaymentStatus) {
    metrics::counter!("racepay_registrations_total", "status" => status.as_str()).increment(1);
}

/// Record one gateway call.
pub fn record_gateway_attempt(outcome: AttemptOutcome, elapsed: Duration) {
    metrics::counter!("racepay_gateway_attempts_total", "outcome" => outcome.as_str())
        .increment(1);
    metrics::histogram!("racepay_gateway_duration_seconds").record(elapsed.as_secs_f64());
}

/// Record a hold request.
pub fn record_hold(held: bool) {
    let result = if held { "held" } else { "insufficient" };
    metrics::counter!("racepay_holds_total", "result" => result).increment(1);
}

/// Record groups expired by one sweeper pass.
pub fn record_expired(count: u64) {
    metrics::counter!("racepay_sweeper_expired_total").increment(count);
}

/// Record a confirmation delivery status (sent, failed, deferred, resent).
pub fn record_notification(status: &'static str) {
    metrics::counter!("racepay_notifications_total", "status" => status).increment(1);
}

/// Record a conflict caught before writing, such as a generated `reference`
/// that was already used. Constraint violations are counted by the store.
pub fn record_store_conflict(kind: &'static str) {
    metrics::counter!("racepay_store_conflicts_total", "kind" => kind).increment(1);
}
