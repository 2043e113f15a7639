//! Payment gateway contract.
//!
//! The provider speaks its own vocabulary of status strings and codes. Everything
//! downstream of the adapter switches on [`GatewayErrorCode`] instead, a closed
//! set normalized once at the boundary.

use crate::types::{Money, UnknownVariant};
use crate::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Normalized gateway failure taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayErrorCode {
    /// Payer's phone/id is not enrolled for mobile payments at the bank
    AccountNotRegistered,
    /// Provider or bank is down
    ProviderUnavailable,
    /// Reference was already used with the provider
    DuplicateReference,
    /// Provider reported a communication failure with the bank
    CommunicationError,
    /// Call timed out
    Timeout,
    /// Request was malformed
    ValidationError,
    /// Provider refused the payment for any other reason
    Declined,
}

impl GatewayErrorCode {
    /// Every code, in signature-scan priority order.
    pub const ALL: [Self; 7] = [
        Self::AccountNotRegistered,
        Self::ProviderUnavailable,
        Self::DuplicateReference,
        Self::CommunicationError,
        Self::Timeout,
        Self::ValidationError,
        Self::Declined,
    ];

    /// Canonical upper-case label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AccountNotRegistered => "ACCOUNT_NOT_REGISTERED",
            Self::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            Self::DuplicateReference => "DUPLICATE_REFERENCE",
            Self::CommunicationError => "COMMUNICATION_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::Declined => "DECLINED",
        }
    }

    /// Whether a new attempt may succeed where this one failed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable
                | Self::DuplicateReference
                | Self::CommunicationError
                | Self::Timeout
        )
    }

    /// What the payer should do next.
    #[must_use]
    pub const fn corrective_action(&self) -> &'static str {
        match self {
            Self::AccountNotRegistered => {
                "Verify that your phone number is registered for mobile payments with the selected bank."
            },
            Self::ProviderUnavailable => {
                "The payment provider is unavailable. Try again later or choose another payment method."
            },
            Self::DuplicateReference => "Try again.",
            Self::CommunicationError | Self::Timeout => {
                "We could not reach the payment provider. Try again; your form data was kept."
            },
            Self::ValidationError => "Review the payment details and submit again.",
            Self::Declined => "Contact your bank or use another payment method.",
        }
    }
}

impl FromStr for GatewayErrorCode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "gateway error code",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound mobile-payment request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRequest {
    /// Unique reference for this call
    pub reference: String,
    /// Amount to charge
    pub amount: Money,
    /// ISO currency code
    pub currency: String,
    /// Payer's national id
    pub payer_id: String,
    /// Payer's registered phone
    pub phone: String,
    /// Payer's bank selector
    pub bank_code: String,
}

/// Raw provider response, before classification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawGatewayResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body, kept verbatim for audit
    pub body: String,
}

impl RawGatewayResponse {
    /// Build a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// The call produced no response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No response within the deadline
    #[error("gateway call timed out")]
    Timeout,

    /// Connection could not be established or was reset
    #[error("gateway connection failed: {0}")]
    Connection(String),

    /// Any other transport failure
    #[error("gateway transport error: {0}")]
    Other(String),
}

/// Network boundary to the payment provider.
///
/// Implementations perform exactly one request per call and never retry;
/// retry and classification belong to the adapter.
pub trait GatewayTransport: Send + Sync {
    /// Send one payment request.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no HTTP response was obtained.
    fn send(&self, request: GatewayRequest)
    -> BoxFuture<'_, Result<RawGatewayResponse, TransportError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability_follows_taxonomy() {
        let retryable: Vec<_> = GatewayErrorCode::ALL
            .into_iter()
            .filter(GatewayErrorCode::is_retryable)
            .collect();

        assert_eq!(
            retryable,
            vec![
                GatewayErrorCode::ProviderUnavailable,
                GatewayErrorCode::DuplicateReference,
                GatewayErrorCode::CommunicationError,
                GatewayErrorCode::Timeout,
            ]
        );
    }

    #[test]
    fn test_labels_parse_back() {
        for code in GatewayErrorCode::ALL {
            assert_eq!(code.as_str().parse::<GatewayErrorCode>(), Ok(code));
        }
    }

    #[test]
    fn test_account_not_registered_names_the_fix() {
        assert!(GatewayErrorCode::AccountNotRegistered
            .corrective_action()
            .contains("registered"));
    }
}
