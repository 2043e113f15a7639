//! Registration input and its validation.

use super::RegistrationError;
use chrono::NaiveDate;
use racepay_core::types::{Gender, PaymentMethod, Registrant, Runner, Size};
use serde::Deserialize;
use std::collections::HashSet;

/// A registration as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistrationRequest {
    /// Deduplication key, taken from the `Idempotency-Key` header
    #[serde(skip)]
    pub idempotency_key: Option<String>,
    /// Contact details
    pub registrant: Registrant,
    /// Runners, one slot each
    pub runners: Vec<RunnerInput>,
    /// Payment channel and its fields
    pub payment_method: PaymentMethod,
}

/// A runner as submitted. Size and gender are still raw strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunnerInput {
    /// Full name
    pub full_name: String,
    /// National id or passport number
    pub identification: String,
    /// Shirt size label (`XS` to `XXL`)
    pub size: String,
    /// Gender label (`F` or `M`)
    pub gender: String,
    /// Date of birth
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    /// Runner's own email
    #[serde(default)]
    pub email: Option<String>,
}

fn invalid(message: impl Into<String>) -> RegistrationError {
    RegistrationError::Validation(message.into())
}

fn require(value: &str, field: &str) -> Result<(), RegistrationError> {
    if value.trim().is_empty() {
        Err(invalid(format!("{field} is required")))
    } else {
        Ok(())
    }
}

fn validate_payment(method: &PaymentMethod) -> Result<(), RegistrationError> {
    match method {
        PaymentMethod::MobilePayment {
            bank_code,
            phone,
            payer_id,
        } => {
            require(bank_code, "payment_method.bank_code")?;
            require(phone, "payment_method.phone")?;
            require(payer_id, "payment_method.payer_id")
        },
        PaymentMethod::BankTransfer { reference, .. } => {
            require(reference, "payment_method.reference")
        },
        PaymentMethod::InPerson { .. } => Ok(()),
        PaymentMethod::Exempt {
            authorized_by,
            reason,
        } => {
            require(authorized_by, "payment_method.authorized_by")?;
            require(reason, "payment_method.reason")
        },
    }
}

impl RegistrationRequest {
    /// Check the request shape and resolve runner rows.
    ///
    /// Names and identifications come back trimmed. No side effects.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Validation`] naming the first problem.
    pub fn validate(&self, max_runners: usize) -> Result<Vec<Runner>, RegistrationError> {
        require(&self.registrant.name, "registrant.name")?;
        if !self.registrant.email.contains('@') {
            return Err(invalid("registrant.email must be an email address"));
        }

        if self.runners.is_empty() {
            return Err(invalid("at least one runner is required"));
        }
        if self.runners.len() > max_runners {
            return Err(invalid(format!(
                "a group holds at most {max_runners} runners, got {}",
                self.runners.len()
            )));
        }

        validate_payment(&self.payment_method)?;

        let mut seen = HashSet::with_capacity(self.runners.len());
        self.runners
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let position = index + 1;
                require(&input.full_name, &format!("runners[{position}].full_name"))?;
                require(&input.identification, &format!("runners[{position}].identification"))?;

                let size: Size = input
                    .size
                    .parse()
                    .map_err(|e| invalid(format!("runners[{position}]: {e}")))?;
                let gender: Gender = input
                    .gender
                    .parse()
                    .map_err(|e| invalid(format!("runners[{position}]: {e}")))?;

                let identification = input.identification.trim().to_string();
                if !seen.insert(identification.to_lowercase()) {
                    return Err(invalid(format!(
                        "identification {identification} appears more than once in the group"
                    )));
                }

                Ok(Runner {
                    full_name: input.full_name.trim().to_string(),
                    identification,
                    size,
                    gender,
                    birth_date: input.birth_date,
                    email: input.email.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Tests are allowed to panic on failures
mod tests {
    use super::*;
    use racepay_testing::fixtures::{bank_transfer, mobile_payment, registrant};

    fn input(identification: &str, size: &str, gender: &str) -> RunnerInput {
        RunnerInput {
            full_name: format!(" Runner {identification} "),
            identification: identification.to_string(),
            size: size.to_string(),
            gender: gender.to_string(),
            birth_date: None,
            email: None,
        }
    }

    fn request(runners: Vec<RunnerInput>) -> RegistrationRequest {
        RegistrationRequest {
            idempotency_key: None,
            registrant: registrant(),
            runners,
            payment_method: mobile_payment(),
        }
    }

    fn message(result: Result<Vec<Runner>, RegistrationError>) -> String {
        match result {
            Err(RegistrationError::Validation(message)) => message,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn resolves_rows_and_trims_names() {
        let runners = request(vec![input("V-1", "m", "f"), input(" V-2 ", "XL", "M")])
            .validate(20)
            .unwrap();

        assert_eq!(runners[0].size, Size::M);
        assert_eq!(runners[0].gender, Gender::Female);
        assert_eq!(runners[0].full_name, "Runner V-1");
        assert_eq!(runners[1].identification, "V-2");
    }

    #[test]
    fn empty_group_is_rejected() {
        assert_eq!(message(request(vec![]).validate(20)), "at least one runner is required");
    }

    #[test]
    fn oversized_group_is_rejected() {
        let runners = (0..3).map(|i| input(&format!("V-{i}"), "S", "F")).collect();
        assert!(message(request(runners).validate(2)).contains("at most 2"));
    }

    #[test]
    fn unknown_size_names_the_runner() {
        let err = message(request(vec![input("V-1", "M", "F"), input("V-2", "XXXL", "F")]).validate(20));
        assert!(err.starts_with("runners[2]"), "{err}");
    }

    #[test]
    fn identifications_are_unique_ignoring_case_and_whitespace() {
        let err = message(
            request(vec![input("ab-1", "M", "F"), input(" AB-1", "L", "M")]).validate(20),
        );
        assert!(err.contains("more than once"), "{err}");
    }

    #[test]
    fn blank_identification_is_rejected() {
        let err = message(request(vec![input("   ", "M", "F")]).validate(20));
        assert_eq!(err, "runners[1].identification is required");
    }

    #[test]
    fn registrant_email_must_look_like_one() {
        let mut req = request(vec![input("V-1", "M", "F")]);
        req.registrant.email = "not-an-email".to_string();
        assert!(message(req.validate(20)).contains("registrant.email"));
    }

    #[test]
    fn payment_fields_are_required() {
        let mut req = request(vec![input("V-1", "M", "F")]);
        req.payment_method = bank_transfer("  ");
        assert_eq!(message(req.validate(20)), "payment_method.reference is required");

        req.payment_method = PaymentMethod::Exempt {
            authorized_by: "staff".to_string(),
            reason: String::new(),
        };
        assert_eq!(message(req.validate(20)), "payment_method.reason is required");
    }

    #[test]
    fn deserializes_without_idempotency_key() {
        let json = serde_json::json!({
            "registrant": { "name": "Ana", "email": "ana@example.com", "phone": "0414" },
            "runners": [{ "full_name": "Ana", "identification": "V-1", "size": "M", "gender": "F" }],
            "payment_method": { "type": "in_person" }
        });

        let req: RegistrationRequest = serde_json::from_value(json).unwrap();

        assert_eq!(req.idempotency_key, None);
        assert_eq!(req.payment_method, PaymentMethod::InPerson { receipt: None });
    }
}
