//! Message dispatch contract used by the confirmation notifier.

use crate::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A templated message for one recipient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Recipient address
    pub recipient: String,
    /// Template name understood by the delivery service
    pub template: String,
    /// Template variables
    pub payload: serde_json::Value,
}

/// Delivery failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The delivery service could not be reached; worth retrying
    #[error("message transport failed: {0}")]
    Transport(String),

    /// The delivery service refused the message; retrying will not help
    #[error("message rejected: {0}")]
    Rejected(String),
}

impl DispatchError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Message delivery service (email, SMS, webhook).
pub trait MessageDispatcher: Send + Sync {
    /// Deliver one message.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the message was not accepted for delivery.
    fn send(&self, message: OutboundMessage) -> BoxFuture<'_, Result<(), DispatchError>>;
}
