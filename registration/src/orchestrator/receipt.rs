//! What a caller gets back from a registration.

use chrono::{DateTime, Utc};
use racepay_core::gateway::GatewayErrorCode;
use racepay_core::types::{GatewayAttempt, GroupCode, PaymentStatus, RegistrationGroup};
use serde::Serialize;

/// Outcome of `register_and_pay`.
///
/// Gateway rejections are receipts too: `status` is `rejected` and
/// `error_code`, `can_retry` and `action` tell the payer what to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    /// Group status after the call
    pub status: PaymentStatus,
    /// Public group code
    pub group_code: GroupCode,
    /// End of the reservation window, while the group still holds inventory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_until: Option<DateTime<Utc>>,
    /// Normalized gateway failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<GatewayErrorCode>,
    /// Whether submitting the registration again may succeed
    pub can_retry: bool,
    /// Corrective instruction for the payer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Raw provider payload of the deciding attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
    /// Approved gateway reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_reference: Option<String>,
    /// `true` when an earlier registration with the same idempotency key was
    /// returned instead of creating a new one
    pub replayed: bool,
}

impl Receipt {
    /// Receipt describing `group` as stored.
    #[must_use]
    pub fn from_group(group: &RegistrationGroup) -> Self {
        Self {
            status: group.status,
            group_code: group.code.clone(),
            reserved_until: PaymentStatus::OPEN
                .contains(&group.status)
                .then_some(group.reserved_until),
            error_code: None,
            can_retry: false,
            action: None,
            proof: None,
            gateway_reference: group.gateway_reference.clone(),
            replayed: false,
        }
    }

    /// Receipt for a group found through its idempotency key.
    #[must_use]
    pub fn replay(group: &RegistrationGroup) -> Self {
        Self {
            replayed: true,
            ..Self::from_group(group)
        }
    }

    /// Receipt for a group that was just confirmed.
    #[must_use]
    pub fn confirmed(group: &RegistrationGroup, proof: Option<String>) -> Self {
        Self {
            proof,
            ..Self::from_group(group)
        }
    }

    /// Receipt for a group rejected by the gateway.
    #[must_use]
    pub fn rejected(
        group: &RegistrationGroup,
        code: GatewayErrorCode,
        proof: String,
        can_retry: bool,
    ) -> Self {
        Self {
            error_code: Some(code),
            can_retry,
            action: Some(code.corrective_action().to_string()),
            proof: Some(proof),
            ..Self::from_group(group)
        }
    }
}

/// A group with its gateway audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupView {
    /// The group as stored
    #[serde(flatten)]
    pub group: RegistrationGroup,
    /// Gateway attempts, oldest first
    pub attempts: Vec<GatewayAttempt>,
}
