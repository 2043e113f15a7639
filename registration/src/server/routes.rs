//! Router configuration.

use super::state::AppState;
use crate::api::{confirmations, inventory, registrations};
use axum::{
    Router,
    routing::{get, post, put},
};
use racepay_web::handlers::{health_check, readiness};
use racepay_web::{http_trace_layer, request_id_layer};

/// Build the complete router.
///
/// - `/health`, `/ready`
/// - `/api/registrations`, `/api/registrations/:code`
/// - `/api/confirmations/resend`
/// - `/api/inventory`, `/api/inventory/:size/:gender`
///
/// Every response carries an `X-Request-ID`.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/registrations", post(registrations::register))
        .route("/registrations/:code", get(registrations::get_registration))
        .route("/confirmations/resend", post(confirmations::resend))
        .route("/inventory", get(inventory::list_inventory))
        .route("/inventory/:size/:gender", put(inventory::configure_stock));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness))
        .nest("/api", api_routes)
        .layer(http_trace_layer())
        .layer(request_id_layer())
        .with_state(state)
}
