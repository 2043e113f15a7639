//! Registration endpoints.

use crate::orchestrator::{GroupView, Receipt, RegistrationRequest};
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use racepay_core::types::GroupCode;
use racepay_runtime::complete_detached;
use racepay_web::{AppError, IdempotencyKey, WebResult};
use std::sync::Arc;

/// Register a group and pay.
///
/// Gateway refusals are a `200` with `status: "rejected"`; the HTTP error
/// statuses are for validation, exhausted inventory and store failures.
///
/// The registration runs on its own task, so a client that disconnects
/// mid-payment does not abandon the hold halfway.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/registrations \
///   -H 'Idempotency-Key: checkout-7f3a9c' \
///   -H 'Content-Type: application/json' \
///   -d '{"registrant": {...}, "runners": [...], "payment_method": {"type": "mobile_payment", ...}}'
/// ```
pub async fn register(
    State(state): State<AppState>,
    IdempotencyKey(key): IdempotencyKey,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> WebResult<Json<Receipt>> {
    let Json(mut request) = payload.map_err(|rejection| AppError::validation(rejection.body_text()))?;
    request.idempotency_key = key;

    let orchestrator = Arc::clone(&state.orchestrator);
    let receipt = complete_detached(async move { orchestrator.register_and_pay(request).await })
        .await
        .map_err(|e| {
            AppError::internal("Registration task failed").with_source(anyhow::Error::new(e))
        })??;

    Ok(Json(receipt))
}

/// A group and its gateway attempts.
pub async fn get_registration(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> WebResult<Json<GroupView>> {
    let view = state.orchestrator.lookup(&GroupCode::new(code)).await?;
    Ok(Json(view))
}
