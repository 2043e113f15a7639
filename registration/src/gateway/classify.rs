//! Normalization of raw provider responses into [`GatewayOutcome`]s.
//!
//! This is the only place that looks at provider vocabulary. A 2xx response
//! is trusted only after its body has been scanned for known failure
//! signatures. That scan uses a narrower list than refusal normalization:
//! an approval may well mention a "connection" or a passed "validation".

use super::GatewayOutcome;
use racepay_core::gateway::{GatewayErrorCode, RawGatewayResponse, TransportError};
use serde::Deserialize;

/// Provider phrases mapped to taxonomy codes, in scan priority order.
///
/// Canonical labels are matched too, with underscores or spaces.
const SIGNATURES: &[(GatewayErrorCode, &[&str])] = &[
    (
        GatewayErrorCode::AccountNotRegistered,
        &["account_not_registered", "not registered", "no afiliado", "unregistered"],
    ),
    (
        GatewayErrorCode::ProviderUnavailable,
        &["provider_unavailable", "unavailable", "maintenance"],
    ),
    (
        GatewayErrorCode::DuplicateReference,
        &["duplicate_reference", "duplicate", "already used"],
    ),
    (
        GatewayErrorCode::CommunicationError,
        &["communication_error", "communication", "connection"],
    ),
    (GatewayErrorCode::Timeout, &["timeout", "timed out"]),
    (
        GatewayErrorCode::ValidationError,
        &["validation_error", "validation", "invalid"],
    ),
    (GatewayErrorCode::Declined, &["declined"]),
];

/// Failure signatures looked for inside 2xx bodies.
///
/// Only taxonomy labels and phrases that cannot describe a successful
/// payment belong here.
const EMBEDDED_FAILURES: &[(GatewayErrorCode, &[&str])] = &[
    (
        GatewayErrorCode::AccountNotRegistered,
        &["account_not_registered", "not registered", "no afiliado"],
    ),
    (
        GatewayErrorCode::ProviderUnavailable,
        &["provider_unavailable", "service unavailable", "under maintenance"],
    ),
    (
        GatewayErrorCode::DuplicateReference,
        &["duplicate_reference", "reference already used"],
    ),
    (
        GatewayErrorCode::CommunicationError,
        &["communication_error", "communication failure", "connection refused", "connection lost"],
    ),
    (GatewayErrorCode::Timeout, &["timed out"]),
    (GatewayErrorCode::ValidationError, &["validation_error", "validation failed"]),
    (GatewayErrorCode::Declined, &["payment declined", "transaction declined"]),
];

/// Status words that mark a body as a refusal even without a signature.
const FAILURE_STATUSES: &[&str] = &["rejected", "failed", "failure", "error", "declined", "denied"];

#[derive(Debug, Default, Deserialize)]
struct ProviderBody {
    status: Option<String>,
    code: Option<String>,
    message: Option<String>,
    reference: Option<String>,
}

impl ProviderBody {
    fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }

    fn is_failure(&self) -> bool {
        self.status.as_deref().is_some_and(|status| {
            let status = status.trim().to_ascii_lowercase();
            FAILURE_STATUSES.contains(&status.as_str())
        })
    }
}

fn first_match(table: &[(GatewayErrorCode, &[&str])], text: &str) -> Option<GatewayErrorCode> {
    let haystack = text.to_lowercase();
    table
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|phrase| haystack.contains(phrase)))
        .map(|(code, _)| *code)
}

/// First provider synonym in `text`, case-insensitively.
///
/// Meant for bodies already known to be refusals.
#[must_use]
pub fn scan_signature(text: &str) -> Option<GatewayErrorCode> {
    first_match(SIGNATURES, text)
}

/// First failure signature hidden in a successful response body.
#[must_use]
pub fn scan_embedded_failure(text: &str) -> Option<GatewayErrorCode> {
    first_match(EMBEDDED_FAILURES, text)
}

/// Map a provider code string onto the taxonomy.
fn normalize_code(raw: &str) -> Option<GatewayErrorCode> {
    let canonical = raw.trim().to_ascii_uppercase().replace([' ', '-'], "_");
    canonical
        .parse()
        .ok()
        .or_else(|| scan_signature(raw))
}

/// Fallback code for a non-2xx status without a recognizable body.
#[must_use]
pub const fn code_for_status(status: u16) -> GatewayErrorCode {
    match status {
        408 | 504 => GatewayErrorCode::Timeout,
        409 => GatewayErrorCode::DuplicateReference,
        502 | 503 => GatewayErrorCode::ProviderUnavailable,
        500..=599 => GatewayErrorCode::CommunicationError,
        _ => GatewayErrorCode::Declined,
    }
}

/// Classify an HTTP response to the request sent with `sent_reference`.
#[must_use]
pub fn classify_response(response: &RawGatewayResponse, sent_reference: &str) -> GatewayOutcome {
    let parsed = ProviderBody::parse(&response.body);
    let proof = response.body.clone();

    if response.is_success() {
        if let Some(code) = scan_embedded_failure(&response.body) {
            return GatewayOutcome::Ambiguous { code, proof };
        }

        if let Some(body) = parsed.as_ref().filter(|body| body.is_failure()) {
            let code = body
                .code
                .as_deref()
                .and_then(normalize_code)
                .unwrap_or(GatewayErrorCode::Declined);
            return GatewayOutcome::Ambiguous { code, proof };
        }

        let reference = parsed
            .and_then(|body| body.reference)
            .filter(|reference| !reference.trim().is_empty())
            .unwrap_or_else(|| sent_reference.to_string());
        return GatewayOutcome::Approved { reference, proof };
    }

    let code = parsed
        .as_ref()
        .and_then(|body| {
            body.code
                .as_deref()
                .and_then(normalize_code)
                .or_else(|| body.message.as_deref().and_then(scan_signature))
        })
        .or_else(|| scan_signature(&response.body))
        .unwrap_or_else(|| code_for_status(response.status));

    GatewayOutcome::Rejected {
        code,
        proof,
        retryable: code.is_retryable(),
    }
}

/// Classify a call that produced no response.
#[must_use]
pub fn classify_transport(error: &TransportError) -> GatewayOutcome {
    let code = match error {
        TransportError::Timeout => GatewayErrorCode::Timeout,
        TransportError::Connection(_) | TransportError::Other(_) => {
            GatewayErrorCode::CommunicationError
        },
    };
    GatewayOutcome::TransportFailure {
        code,
        reason: error.to_string(),
        retryable: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn respond(status: u16, body: &str) -> GatewayOutcome {
        classify_response(&RawGatewayResponse::new(status, body), "RP-SENT")
    }

    #[test]
    fn clean_success_is_approved_with_sent_reference() {
        assert_eq!(
            respond(200, r#"{"status":"approved"}"#),
            GatewayOutcome::Approved {
                reference: "RP-SENT".to_string(),
                proof: r#"{"status":"approved"}"#.to_string(),
            }
        );
    }

    #[test]
    fn provider_reference_wins_when_present() {
        let outcome = respond(201, r#"{"status":"approved","reference":"BANK-991"}"#);
        assert!(matches!(outcome, GatewayOutcome::Approved { reference, .. } if reference == "BANK-991"));
    }

    #[test]
    fn success_with_embedded_error_is_ambiguous() {
        let outcome = respond(200, "OK - COMMUNICATION_ERROR while contacting bank");
        assert_eq!(outcome.error_code(), Some(GatewayErrorCode::CommunicationError));
        assert!(matches!(outcome, GatewayOutcome::Ambiguous { .. }));
    }

    #[test]
    fn success_with_synonym_is_ambiguous() {
        let outcome = respond(200, r#"{"status":"ok","message":"Cliente no afiliado"}"#);
        assert_eq!(
            outcome,
            GatewayOutcome::Ambiguous {
                code: GatewayErrorCode::AccountNotRegistered,
                proof: r#"{"status":"ok","message":"Cliente no afiliado"}"#.to_string(),
            }
        );
    }

    #[test]
    fn approval_mentioning_benign_words_stays_approved() {
        let outcome = respond(
            200,
            r#"{"status":"approved","reference":"BANK-1","message":"Payment approved over secure connection","validation":"passed"}"#,
        );
        assert!(matches!(outcome, GatewayOutcome::Approved { reference, .. } if reference == "BANK-1"));

        let outcome = respond(200, r#"{"status":"ok","note":"duplicate receipt emailed; provider availability 99.9%"}"#);
        assert!(matches!(outcome, GatewayOutcome::Approved { .. }));
    }

    #[test]
    fn success_with_unambiguous_error_phrase_is_ambiguous() {
        let outcome = respond(200, r#"{"status":"ok","message":"Request timed out at issuer"}"#);
        assert_eq!(outcome.error_code(), Some(GatewayErrorCode::Timeout));
        assert!(matches!(outcome, GatewayOutcome::Ambiguous { .. }));
    }

    #[test]
    fn success_with_failure_status_is_never_approved() {
        let outcome = respond(200, r#"{"status":"rejected","code":"R51"}"#);
        assert_eq!(outcome.error_code(), Some(GatewayErrorCode::Declined));
        assert!(!matches!(outcome, GatewayOutcome::Approved { .. }));
    }

    #[test]
    fn rejection_uses_body_code() {
        let outcome = respond(422, r#"{"code":"ACCOUNT_NOT_REGISTERED","message":"x"}"#);
        assert_eq!(
            outcome,
            GatewayOutcome::Rejected {
                code: GatewayErrorCode::AccountNotRegistered,
                proof: r#"{"code":"ACCOUNT_NOT_REGISTERED","message":"x"}"#.to_string(),
                retryable: false,
            }
        );
    }

    #[test]
    fn rejection_normalizes_spelled_out_codes() {
        let outcome = respond(409, r#"{"code":"duplicate reference"}"#);
        assert_eq!(outcome.error_code(), Some(GatewayErrorCode::DuplicateReference));
        assert!(outcome.is_retryable());
    }

    #[test]
    fn rejection_falls_back_to_status() {
        assert_eq!(respond(503, "").error_code(), Some(GatewayErrorCode::ProviderUnavailable));
        assert_eq!(respond(504, "").error_code(), Some(GatewayErrorCode::Timeout));
        assert_eq!(respond(500, "").error_code(), Some(GatewayErrorCode::CommunicationError));
        assert_eq!(respond(402, "").error_code(), Some(GatewayErrorCode::Declined));
        assert_eq!(respond(409, "").error_code(), Some(GatewayErrorCode::DuplicateReference));
    }

    #[test]
    fn plain_text_rejection_is_scanned() {
        let outcome = respond(400, "Invalid phone number");
        assert_eq!(outcome.error_code(), Some(GatewayErrorCode::ValidationError));
        assert!(!outcome.is_retryable());
    }

    #[test]
    fn transport_errors_are_retryable() {
        let timeout = classify_transport(&TransportError::Timeout);
        assert_eq!(timeout.error_code(), Some(GatewayErrorCode::Timeout));
        assert!(timeout.is_retryable());

        let reset = classify_transport(&TransportError::Connection("reset".to_string()));
        assert_eq!(reset.error_code(), Some(GatewayErrorCode::CommunicationError));
        assert!(reset.is_retryable());
    }

    #[test]
    fn signature_priority_is_stable() {
        assert_eq!(
            scan_signature("Timeout: communication failure"),
            Some(GatewayErrorCode::CommunicationError)
        );
        assert_eq!(scan_signature("all good"), None);
    }
}
