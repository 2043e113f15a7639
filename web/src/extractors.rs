//! Custom Axum extractors.
//!
//! - [`IdempotencyKey`]: optional `Idempotency-Key` header, validated
//! - [`RequestId`]: id assigned by the request id middleware

use crate::error::AppError;
use crate::middleware::RequestId;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Header carrying the client's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Accepted key length, in characters.
pub const IDEMPOTENCY_KEY_LEN: std::ops::RangeInclusive<usize> = 8..=128;

/// Client-supplied idempotency key.
///
/// Absent header extracts as `IdempotencyKey(None)`. A present header must be
/// 8-128 visible ASCII characters, otherwise the request is rejected with
/// `422 VALIDATION_ERROR`.
///
/// ```ignore
/// async fn register(key: IdempotencyKey, Json(mut request): Json<RegistrationRequest>) -> WebResult<...> {
///     request.idempotency_key = key.0;
///     orchestrator.register_and_pay(request).await
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyKey(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for IdempotencyKey
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(IDEMPOTENCY_KEY_HEADER) else {
            return Ok(Self(None));
        };

        let key = value
            .to_str()
            .map_err(|_| AppError::validation("Idempotency-Key must be visible ASCII"))?;

        if !IDEMPOTENCY_KEY_LEN.contains(&key.len()) || !key.bytes().all(|b| b.is_ascii_graphic())
        {
            return Err(AppError::validation(
                "Idempotency-Key must be 8 to 128 visible ASCII characters",
            ));
        }

        Ok(Self(Some(key.to_string())))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    /// Falls back to `"unknown"` when the middleware is not installed.
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Self>()
            .cloned()
            .unwrap_or_else(|| Self("unknown".to_string())))
    }
}
