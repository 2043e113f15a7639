//! Axum plumbing shared by racepay HTTP services.
//!
//! Handlers return [`WebResult`]; domain errors are mapped into [`AppError`],
//! which renders `{code, message, can_retry, action}` bodies. The router is
//! wrapped in [`request_id_layer`] (outermost) and [`http_trace_layer`] so every
//! log line for a request carries its id.
//!
//! ```ignore
//! use racepay_web::{handlers, http_trace_layer, request_id_layer};
//!
//! let app = Router::new()
//!     .route("/health", get(handlers::health_check))
//!     .route("/ready", get(handlers::readiness))
//!     .with_state(store)
//!     .layer(http_trace_layer())
//!     .layer(request_id_layer());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

pub use error::{AppError, ErrorBody};
pub use extractors::{IDEMPOTENCY_KEY_HEADER, IdempotencyKey};
pub use middleware::{REQUEST_ID_HEADER, RequestId, http_trace_layer, request_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
