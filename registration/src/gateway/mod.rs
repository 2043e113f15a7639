//! Payment gateway adapter.
//!
//! Wraps a [`GatewayTransport`] with a per-call timeout and turns whatever
//! comes back into a [`GatewayOutcome`]. One call to [`GatewayAdapter::submit`]
//! is exactly one provider request; retry decisions are the orchestrator's.

pub mod classify;
pub mod http;

pub use classify::{classify_response, classify_transport, scan_embedded_failure, scan_signature};
pub use http::HttpGatewayTransport;

use crate::metrics;
use racepay_core::gateway::{GatewayErrorCode, GatewayRequest, GatewayTransport, TransportError};
use racepay_core::types::AttemptOutcome;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Classified result of one gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    /// The provider approved the payment.
    Approved {
        /// Reference the payment was booked under
        reference: String,
        /// Raw response body
        proof: String,
    },
    /// The provider refused the payment.
    Rejected {
        /// Normalized reason
        code: GatewayErrorCode,
        /// Raw response body
        proof: String,
        /// Whether a new attempt may succeed
        retryable: bool,
    },
    /// A 2xx response whose body carries a failure.
    Ambiguous {
        /// Normalized failure found in the body
        code: GatewayErrorCode,
        /// Raw response body
        proof: String,
    },
    /// No usable response.
    TransportFailure {
        /// `TIMEOUT` or `COMMUNICATION_ERROR`
        code: GatewayErrorCode,
        /// Transport error text
        reason: String,
        /// Always `true` for the transports we know
        retryable: bool,
    },
}

impl GatewayOutcome {
    /// Normalized error, `None` for approvals.
    #[must_use]
    pub const fn error_code(&self) -> Option<GatewayErrorCode> {
        match self {
            Self::Approved { .. } => None,
            Self::Rejected { code, .. }
            | Self::Ambiguous { code, .. }
            | Self::TransportFailure { code, .. } => Some(*code),
        }
    }

    /// Whether the orchestrator may try again with a new reference.
    ///
    /// Ambiguous outcomes are never retried: the provider may have acted on
    /// the request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Rejected { retryable, .. } | Self::TransportFailure { retryable, .. } => {
                *retryable
            },
            Self::Approved { .. } | Self::Ambiguous { .. } => false,
        }
    }

    /// Audit classification.
    #[must_use]
    pub const fn attempt_outcome(&self) -> AttemptOutcome {
        match self {
            Self::Approved { .. } => AttemptOutcome::Approved,
            Self::Rejected { .. } => AttemptOutcome::Rejected,
            Self::Ambiguous { .. } => AttemptOutcome::Ambiguous,
            Self::TransportFailure { .. } => AttemptOutcome::TransportFailure,
        }
    }

    /// Raw body, or the transport error text.
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::Approved { proof, .. }
            | Self::Rejected { proof, .. }
            | Self::Ambiguous { proof, .. } => proof,
            Self::TransportFailure { reason, .. } => reason,
        }
    }
}

/// Gateway adapter: timeout, classification, timing.
#[derive(Clone)]
pub struct GatewayAdapter {
    transport: Arc<dyn GatewayTransport>,
    timeout: Duration,
}

impl GatewayAdapter {
    /// Adapter over `transport`, giving up on a call after `timeout`.
    #[must_use]
    pub fn new(transport: Arc<dyn GatewayTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Send one request and classify the result.
    pub async fn submit(&self, request: GatewayRequest) -> GatewayOutcome {
        let reference = request.reference.clone();
        let started = Instant::now();

        let outcome = match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(Ok(response)) => classify_response(&response, &reference),
            Ok(Err(error)) => classify_transport(&error),
            Err(_) => classify_transport(&TransportError::Timeout),
        };

        let elapsed = started.elapsed();
        metrics::record_gateway_attempt(outcome.attempt_outcome(), elapsed);
        tracing::info!(
            reference = %reference,
            outcome = outcome.attempt_outcome().as_str(),
            code = outcome.error_code().map(|code| code.as_str()),
            elapsed_ms = elapsed.as_millis(),
            "Gateway call classified"
        );

        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use racepay_core::types::Money;
    use racepay_testing::{ScriptedTransport, Step};

    fn request(reference: &str) -> GatewayRequest {
        GatewayRequest {
            reference: reference.to_string(),
            amount: Money::from_cents(5_000),
            currency: "USD".to_string(),
            payer_id: "V-12345678".to_string(),
            phone: "04145550101".to_string(),
            bank_code: "0102".to_string(),
        }
    }

    fn adapter(steps: Vec<Step>) -> (GatewayAdapter, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(steps));
        let adapter = GatewayAdapter::new(transport.clone(), Duration::from_secs(15));
        (adapter, transport)
    }

    #[tokio::test]
    async fn approval_passes_through() {
        let (adapter, transport) = adapter(vec![Step::approved()]);

        let outcome = adapter.submit(request("RP1")).await;

        assert!(matches!(outcome, GatewayOutcome::Approved { ref reference, .. } if reference == "RP1"));
        assert_eq!(transport.requests()[0].reference, "RP1");
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_gateway_times_out_as_retryable_transport_failure() {
        let (adapter, _) = adapter(vec![Step::Hang]);

        let outcome = adapter.submit(request("RP1")).await;

        assert_eq!(outcome.attempt_outcome(), AttemptOutcome::TransportFailure);
        assert_eq!(outcome.error_code(), Some(GatewayErrorCode::Timeout));
        assert!(outcome.is_retryable());
    }

    #[tokio::test]
    async fn connection_failure_is_communication_error() {
        let (adapter, _) = adapter(vec![Step::Fail(TransportError::Connection(
            "connection reset".to_string(),
        ))]);

        let outcome = adapter.submit(request("RP1")).await;

        assert_eq!(outcome.error_code(), Some(GatewayErrorCode::CommunicationError));
        assert_eq!(outcome.raw(), "gateway connection failed: connection reset");
    }

    #[tokio::test]
    async fn ambiguous_outcome_is_not_retryable_even_with_retryable_code() {
        let (adapter, _) = adapter(vec![Step::raw(200, "COMMUNICATION_ERROR")]);

        let outcome = adapter.submit(request("RP1")).await;

        assert_eq!(outcome.attempt_outcome(), AttemptOutcome::Ambiguous);
        assert!(!outcome.is_retryable());
    }
}
