//! Builders for domain values used across test suites.

use chrono::{DateTime, Duration, Utc};
use racepay_core::types::{
    Gender, GroupCode, HoldToken, Money, PaymentMethod, PaymentStatus, Registrant,
    RegistrationGroup, Runner, Size,
};

/// A runner with the given identification and row.
#[must_use]
pub fn runner(identification: &str, size: Size, gender: Gender) -> Runner {
    Runner {
        full_name: format!("Runner {identification}"),
        identification: identification.to_string(),
        size,
        gender,
        birth_date: None,
        email: None,
    }
}

/// A registrant with valid contact details.
#[must_use]
pub fn registrant() -> Registrant {
    Registrant {
        name: "Ana Rivas".to_string(),
        email: "ana@example.com".to_string(),
        phone: "+58 414 555 0101".to_string(),
    }
}

/// Mobile payment details accepted by the scripted gateway.
#[must_use]
pub fn mobile_payment() -> PaymentMethod {
    PaymentMethod::MobilePayment {
        bank_code: "0102".to_string(),
        phone: "04145550101".to_string(),
        payer_id: "V-12345678".to_string(),
    }
}

/// Manual bank transfer with the given reference.
#[must_use]
pub fn bank_transfer(reference: &str) -> PaymentMethod {
    PaymentMethod::BankTransfer {
        reference: reference.to_string(),
        proof_file: Some("uploads/proof.pdf".to_string()),
    }
}

/// A stored group for `runners`, created at `at` with a 72-hour window.
#[must_use]
pub fn group(
    code: &str,
    hold_token: HoldToken,
    runners: Vec<Runner>,
    status: PaymentStatus,
    at: DateTime<Utc>,
) -> RegistrationGroup {
    let count = u32::try_from(runners.len()).unwrap_or(u32::MAX);
    RegistrationGroup {
        code: GroupCode::new(code),
        idempotency_key: None,
        registrant: registrant(),
        runners,
        payment_method: mobile_payment(),
        status,
        hold_token,
        amount: Money::from_cents(2_500).times(count),
        reserved_until: at + Duration::hours(72),
        gateway_reference: None,
        confirmed_at: None,
        notification_pending: false,
        created_at: at,
        updated_at: at,
    }
}
