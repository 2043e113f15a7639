//! HTTP API handlers.
//!
//! - `POST /api/registrations` - register a group and pay
//! - `GET /api/registrations/:code` - group status with its gateway attempts
//! - `POST /api/confirmations/resend` - manual confirmation resend
//! - `GET /api/inventory` - counters of every row
//! - `PUT /api/inventory/:size/:gender` - configure a row's stock

pub mod confirmations;
pub mod inventory;
pub mod registrations;

use crate::ledger::LedgerError;
use crate::notifier::NotifyError;
use crate::orchestrator::RegistrationError;
use axum::http::StatusCode;
use racepay_core::store::StoreError;
use racepay_web::AppError;

fn store_unavailable(error: StoreError) -> AppError {
    AppError::unavailable("PERSISTENCE_FAILURE", "The registration store is unavailable; try again")
        .with_source(anyhow::Error::new(error))
}

impl From<RegistrationError> for AppError {
    fn from(error: RegistrationError) -> Self {
        match error {
            RegistrationError::Validation(message) => Self::validation(message),
            RegistrationError::InventoryExhausted { .. } => {
                Self::conflict("INVENTORY_EXHAUSTED", error.to_string())
                    .with_action("Choose another size or try again later")
            },
            RegistrationError::Persistence(e) => store_unavailable(e),
            RegistrationError::GroupNotFound(code) => Self::not_found("Registration", code),
        }
    }
}

impl From<NotifyError> for AppError {
    fn from(error: NotifyError) -> Self {
        match error {
            NotifyError::GroupNotFound(code) => Self::not_found("Registration", code),
            NotifyError::NotConfirmed { .. } => Self::conflict("NOT_CONFIRMED", error.to_string()),
            NotifyError::Undelivered { .. } => {
                Self::new(StatusCode::BAD_GATEWAY, error.to_string(), "NOTIFICATION_FAILED")
                    .retryable(true)
            },
            NotifyError::Store(e) => store_unavailable(e),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::Store(e @ StoreError::StockBelowCommitted { .. }) => {
                Self::conflict("STOCK_BELOW_COMMITTED", e.to_string())
            },
            LedgerError::Store(e) => store_unavailable(e),
            other => Self::internal(other.to_string()),
        }
    }
}
