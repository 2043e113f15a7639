//! Manual confirmation resend.

use crate::server::state::AppState;
use axum::{Json, extract::State};
use racepay_core::types::GroupCode;
use racepay_web::WebResult;
use serde::{Deserialize, Serialize};

/// Resend request body.
#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    /// Group to resend the confirmation for
    pub group_code: GroupCode,
}

/// Resend result.
#[derive(Debug, Serialize)]
pub struct ResendResponse {
    /// Group the confirmation was sent for
    pub group_code: GroupCode,
    /// Always `"sent"`; failures are errors
    pub status: &'static str,
}

/// Resend the confirmation of a confirmed group.
///
/// Clears `notification_pending` when delivery succeeds.
pub async fn resend(
    State(state): State<AppState>,
    Json(body): Json<ResendRequest>,
) -> WebResult<Json<ResendResponse>> {
    state.notifier.resend(&body.group_code).await?;
    Ok(Json(ResendResponse {
        group_code: body.group_code,
        status: "sent",
    }))
}
