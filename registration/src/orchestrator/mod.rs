//! Registration orchestrator.
//!
//! Drives one registration through hold, group creation and payment:
//!
//! ```text
//! pending ──▶ processing ──▶ confirmed   (hold committed)
//!    │             └───────▶ rejected    (hold released)
//!    └──────────────────────▶ confirmed   (manual methods)
//! pending | processing ─────▶ expired     (sweeper)
//! ```
//!
//! Every status change goes through [`Ledger::settle`], which applies the
//! transition and the hold's commit or release together. Once a
//! hold exists, every failure path releases it before returning, or leaves
//! the group open for the sweeper when even that is impossible.

pub mod receipt;
pub mod request;

pub use receipt::{GroupView, Receipt};
pub use request::{RegistrationRequest, RunnerInput};

use crate::config::RegistrationConfig;
use crate::gateway::{GatewayAdapter, GatewayOutcome};
use crate::ledger::{Ledger, LedgerError};
use crate::metrics;
use crate::notifier::Notifier;
use racepay_core::environment::{Clock, RandomReferenceGenerator, ReferenceGenerator, SystemClock};
use racepay_core::gateway::{GatewayErrorCode, GatewayRequest};
use racepay_core::store::{HoldDisposition, RegistrationStore, SettleOutcome, Settlement, StoreError};
use racepay_core::types::{
    GatewayAttempt, GroupCode, HoldToken, InventoryKey, Money, PaymentMethod,
    PaymentStatus, RegistrationGroup, lines_for,
};
use racepay_runtime::RetryPolicy;
use std::sync::Arc;
use thiserror::Error;

/// Candidate references drawn before giving up on finding an unused one.
const MAX_REFERENCE_CANDIDATES: usize = 5;

/// Registration failures surfaced to callers.
///
/// Gateway refusals are not errors; they come back as a rejected [`Receipt`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Malformed input; nothing was changed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A row could not cover the group; nothing was held.
    #[error("inventory exhausted for {key}: requested {requested}, available {available}")]
    InventoryExhausted {
        /// Row found short
        key: InventoryKey,
        /// Units requested
        requested: u32,
        /// Units available
        available: u32,
    },

    /// The store failed mid-registration. Any hold was released, or is left to
    /// the sweeper if the release failed too.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    /// No group with this code.
    #[error("registration {0} not found")]
    GroupNotFound(GroupCode),
}

impl From<LedgerError> for RegistrationError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::InsufficientStock {
                key,
                requested,
                available,
            } => Self::InventoryExhausted {
                key,
                requested,
                available,
            },
            LedgerError::EmptyRequest => Self::Validation("at least one runner is required".to_string()),
            LedgerError::Store(e) => Self::Persistence(e),
            other => Self::Persistence(StoreError::Database(other.to_string())),
        }
    }
}

/// Payer details of a gateway payment.
struct Payer {
    bank_code: String,
    phone: String,
    payer_id: String,
}

/// Outcome of a settlement attempt.
enum Settled {
    /// The transition was applied.
    Applied(Box<RegistrationGroup>),
    /// Someone else moved the group first; this is its current state.
    Superseded(RegistrationGroup),
}

/// Registration orchestrator. Share it behind an `Arc`.
pub struct Orchestrator {
    store: Arc<dyn RegistrationStore>,
    ledger: Ledger,
    gateway: GatewayAdapter,
    notifier: Notifier,
    retry: RetryPolicy,
    config: RegistrationConfig,
    clock: Arc<dyn Clock>,
    references: Arc<dyn ReferenceGenerator>,
}

impl Orchestrator {
    /// Orchestrator with the system clock and random references.
    #[must_use]
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        gateway: GatewayAdapter,
        notifier: Notifier,
        retry: RetryPolicy,
        config: RegistrationConfig,
    ) -> Self {
        Self {
            ledger: Ledger::new(Arc::clone(&store)),
            store,
            gateway,
            notifier,
            retry,
            config,
            clock: Arc::new(SystemClock),
            references: Arc::new(RandomReferenceGenerator),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the reference generator.
    #[must_use]
    pub fn with_references(mut self, references: Arc<dyn ReferenceGenerator>) -> Self {
        self.references = references;
        self
    }

    /// Register a group and take its payment.
    ///
    /// Returns a confirmed or rejected receipt, or the current state of an
    /// earlier group with the same idempotency key.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::Validation`] for malformed input or a reused
    ///   manual payment reference
    /// - [`RegistrationError::InventoryExhausted`] if a row cannot cover the group
    /// - [`RegistrationError::Persistence`] if the store fails
    #[tracing::instrument(
        skip(self, request),
        name = "register_and_pay",
        fields(runners = request.runners.len(), method = request.payment_method.kind())
    )]
    pub async fn register_and_pay(
        &self,
        request: RegistrationRequest,
    ) -> Result<Receipt, RegistrationError> {
        let runners = request.validate(self.config.max_runners_per_group)?;
        let count = u32::try_from(runners.len())
            .map_err(|_| RegistrationError::Validation("too many runners".to_string()))?;

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self.store.find_live_by_idempotency_key(key).await? {
                tracing::info!(group_code = %existing.code, status = %existing.status, "Replaying registration for idempotency key");
                return Ok(Receipt::replay(&existing));
            }
        }

        let now = self.clock.now();
        let hold = self.ledger.hold(lines_for(&runners), now).await?;

        if let Some(reference) = request.payment_method.manual_reference() {
            match self.store.reference_exists(reference).await {
                Ok(false) => {},
                Ok(true) => {
                    self.release_orphan(hold.token).await;
                    return Err(RegistrationError::Validation(format!(
                        "payment reference {reference} was already used"
                    )));
                },
                Err(e) => {
                    self.release_orphan(hold.token).await;
                    return Err(e.into());
                },
            }
        }

        let group = RegistrationGroup {
            code: GroupCode::generate(),
            idempotency_key: request.idempotency_key,
            registrant: request.registrant,
            runners,
            payment_method: request.payment_method,
            status: PaymentStatus::Pending,
            hold_token: hold.token,
            amount: Money::from_cents(self.config.slot_price_cents).times(count),
            reserved_until: now + self.config.reservation_window(),
            gateway_reference: None,
            confirmed_at: None,
            notification_pending: false,
            created_at: now,
            updated_at: now,
        };

        match self.store.insert_group(group.clone()).await {
            Ok(()) => {},
            Err(StoreError::IdempotencyConflict { existing }) => {
                tracing::info!(group_code = %existing, "Concurrent registration won the idempotency key");
                self.release_orphan(hold.token).await;
                let existing = self.load(&existing).await?;
                return Ok(Receipt::replay(&existing));
            },
            Err(StoreError::ManualReferenceInUse(reference)) => {
                tracing::info!(%reference, "Concurrent registration claimed the payment reference");
                self.release_orphan(hold.token).await;
                return Err(RegistrationError::Validation(format!(
                    "payment reference {reference} was already used"
                )));
            },
            Err(e) => {
                tracing::warn!(error = %e, "Group could not be persisted");
                self.release_orphan(hold.token).await;
                return Err(e.into());
            },
        }

        tracing::info!(
            group_code = %group.code,
            amount = %group.amount,
            reserved_until = %group.reserved_until,
            "Registration created"
        );

        match &group.payment_method {
            PaymentMethod::MobilePayment {
                bank_code,
                phone,
                payer_id,
            } => {
                let payer = Payer {
                    bank_code: bank_code.clone(),
                    phone: phone.clone(),
                    payer_id: payer_id.clone(),
                };
                self.pay_through_gateway(&group, &payer).await
            },
            PaymentMethod::BankTransfer { .. }
            | PaymentMethod::InPerson { .. }
            | PaymentMethod::Exempt { .. } => {
                self.confirm(&group, PaymentStatus::Pending, None, None).await
            },
        }
    }

    /// A group and its gateway attempts.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::GroupNotFound`] or
    /// [`RegistrationError::Persistence`].
    pub async fn lookup(&self, code: &GroupCode) -> Result<GroupView, RegistrationError> {
        let group = self
            .store
            .load_group(code)
            .await?
            .ok_or_else(|| RegistrationError::GroupNotFound(code.clone()))?;
        let attempts = self.store.attempts_for(code).await?;
        Ok(GroupView { group, attempts })
    }

    async fn pay_through_gateway(
        &self,
        group: &RegistrationGroup,
        payer: &Payer,
    ) -> Result<Receipt, RegistrationError> {
        match self.store.mark_processing(&group.code, self.clock.now()).await {
            Ok(true) => {},
            Ok(false) => {
                let current = self.load(&group.code).await?;
                tracing::warn!(group_code = %group.code, status = %current.status, "Group left pending before payment");
                return Ok(Receipt::from_group(&current));
            },
            Err(e) => {
                self.compensate(group, &e).await;
                return Err(e.into());
            },
        }

        let mut attempts = 0_u32;
        let mut resubmission = false;

        loop {
            if !resubmission {
                attempts += 1;
            }

            let reference = match self.fresh_reference().await {
                Ok(reference) => reference,
                Err(e) => {
                    self.compensate(group, &e).await;
                    return Err(e.into());
                },
            };

            let request = GatewayRequest {
                reference: reference.clone(),
                amount: group.amount,
                currency: self.config.currency.clone(),
                payer_id: payer.payer_id.clone(),
                phone: payer.phone.clone(),
                bank_code: payer.bank_code.clone(),
            };
            let outcome = self.gateway.submit(request).await;
            self.record_attempt(&group.code, &reference, &outcome).await;

            let retryable = outcome.is_retryable();
            let (code, proof) = match outcome {
                GatewayOutcome::Approved { reference, proof } => {
                    return self
                        .confirm(group, PaymentStatus::Processing, Some(reference), Some(proof))
                        .await;
                },
                GatewayOutcome::Rejected { code, proof, .. }
                | GatewayOutcome::Ambiguous { code, proof } => (code, proof),
                GatewayOutcome::TransportFailure { code, reason, .. } => (code, reason),
            };

            if retryable && code == GatewayErrorCode::DuplicateReference {
                if resubmission {
                    tracing::warn!(group_code = %group.code, "Second consecutive duplicate reference");
                    return self.reject(group, code, proof, true).await;
                }
                tracing::info!(group_code = %group.code, reference = %reference, "Duplicate reference; resubmitting with a fresh one");
                resubmission = true;
                continue;
            }
            resubmission = false;

            if retryable && self.retry.allows_another(attempts) {
                let delay = self.retry.jittered_delay(attempts - 1);
                tracing::warn!(
                    group_code = %group.code,
                    attempts,
                    code = code.as_str(),
                    delay_ms = delay.as_millis(),
                    "Gateway attempt failed; retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            return self.reject(group, code, proof, code.is_retryable()).await;
        }
    }

    async fn confirm(
        &self,
        group: &RegistrationGroup,
        from: PaymentStatus,
        gateway_reference: Option<String>,
        proof: Option<String>,
    ) -> Result<Receipt, RegistrationError> {
        let settlement = Settlement {
            code: group.code.clone(),
            expected: vec![from],
            to: PaymentStatus::Confirmed,
            disposition: HoldDisposition::Commit,
            at: self.clock.now(),
            gateway_reference,
        };

        match self.settle(group, settlement).await? {
            Settled::Applied(confirmed) => {
                metrics::record_registration(PaymentStatus::Confirmed);
                tracing::info!(
                    group_code = %confirmed.code,
                    method = confirmed.payment_method.kind(),
                    gateway_reference = confirmed.gateway_reference.as_deref(),
                    "Registration confirmed"
                );
                self.notifier.notify(&confirmed.code).await;
                Ok(Receipt::confirmed(&confirmed, proof))
            },
            Settled::Superseded(current) => Ok(Receipt::from_group(&current)),
        }
    }

    async fn reject(
        &self,
        group: &RegistrationGroup,
        code: GatewayErrorCode,
        proof: String,
        can_retry: bool,
    ) -> Result<Receipt, RegistrationError> {
        let settlement = Settlement {
            code: group.code.clone(),
            expected: vec![PaymentStatus::Processing],
            to: PaymentStatus::Rejected,
            disposition: HoldDisposition::Release,
            at: self.clock.now(),
            gateway_reference: None,
        };

        match self.settle(group, settlement).await? {
            Settled::Applied(rejected) => {
                metrics::record_registration(PaymentStatus::Rejected);
                tracing::info!(
                    group_code = %rejected.code,
                    code = code.as_str(),
                    can_retry,
                    "Registration rejected"
                );
                Ok(Receipt::rejected(&rejected, code, proof, can_retry))
            },
            Settled::Superseded(current) => Ok(Receipt::from_group(&current)),
        }
    }

    /// Apply `settlement`, compensating when the store fails.
    async fn settle(
        &self,
        group: &RegistrationGroup,
        settlement: Settlement,
    ) -> Result<Settled, RegistrationError> {
        let to = settlement.to;
        match self.ledger.settle(settlement).await {
            Ok(SettleOutcome::Settled { group, .. }) => Ok(Settled::Applied(group)),
            Ok(SettleOutcome::Stale { current }) => {
                tracing::warn!(group_code = %group.code, %current, target = %to, "Settlement skipped: group moved on");
                Ok(Settled::Superseded(self.load(&group.code).await?))
            },
            Ok(SettleOutcome::HoldUnavailable { state }) => {
                let error = StoreError::Database(format!(
                    "hold {} of group {} is {}",
                    group.hold_token,
                    group.code,
                    state.as_str()
                ));
                tracing::error!(group_code = %group.code, target = %to, hold_state = state.as_str(), "Settlement refused by hold state");
                self.compensate(group, &error).await;
                Err(error.into())
            },
            Ok(SettleOutcome::NotFound) => Err(StoreError::Database(format!(
                "group {} disappeared",
                group.code
            ))
            .into()),
            Err(e) => {
                self.compensate(group, &e).await;
                Err(e.into())
            },
        }
    }

    /// One attempt to reject a stored group and release its hold after a
    /// persistence failure. If that fails too, the sweeper reclaims the hold
    /// once the window closes.
    async fn compensate(&self, group: &RegistrationGroup, cause: &StoreError) {
        let settlement = Settlement {
            code: group.code.clone(),
            expected: PaymentStatus::OPEN.to_vec(),
            to: PaymentStatus::Rejected,
            disposition: HoldDisposition::Release,
            at: self.clock.now(),
            gateway_reference: None,
        };

        match self.ledger.settle(settlement).await {
            Ok(SettleOutcome::Settled { .. }) => {
                metrics::record_registration(PaymentStatus::Rejected);
                tracing::warn!(group_code = %group.code, cause = %cause, "Registration rolled back after persistence failure");
            },
            Ok(outcome) => {
                tracing::warn!(group_code = %group.code, cause = %cause, ?outcome, "Rollback not applied");
            },
            Err(e) => {
                tracing::error!(
                    group_code = %group.code,
                    cause = %cause,
                    error = %e,
                    reserved_until = %group.reserved_until,
                    "Rollback failed; hold left for the sweeper"
                );
            },
        }
    }

    /// Release a hold that no stored group owns.
    async fn release_orphan(&self, token: HoldToken) {
        if let Err(e) = self.ledger.release(token).await {
            tracing::error!(%token, error = %e, "Failed to release hold without group");
        }
    }

    async fn load(&self, code: &GroupCode) -> Result<RegistrationGroup, RegistrationError> {
        self.store.load_group(code).await?.ok_or_else(|| {
            StoreError::Database(format!("group {code} disappeared")).into()
        })
    }

    async fn fresh_reference(&self) -> Result<String, StoreError> {
        let mut candidate = self.references.next_reference();
        for _ in 1..MAX_REFERENCE_CANDIDATES {
            if !self.store.reference_exists(&candidate).await? {
                return Ok(candidate);
            }
            metrics::record_store_conflict("reference");
            tracing::warn!(reference = %candidate, "Generated reference already used; drawing another");
            candidate = self.references.next_reference();
        }
        if self.store.reference_exists(&candidate).await? {
            return Err(StoreError::DuplicateReference(candidate));
        }
        Ok(candidate)
    }

    async fn record_attempt(&self, code: &GroupCode, reference: &str, outcome: &GatewayOutcome) {
        let attempt = GatewayAttempt {
            reference: reference.to_string(),
            group_code: code.clone(),
            raw_response: outcome.raw().to_string(),
            normalized_error_code: outcome.error_code(),
            outcome: outcome.attempt_outcome(),
            created_at: self.clock.now(),
        };

        match self.store.record_attempt(attempt).await {
            Ok(()) => {},
            Err(StoreError::DuplicateReference(reference)) => {
                tracing::warn!(group_code = %code, %reference, "Attempt reference was recorded before");
            },
            Err(e) => {
                tracing::warn!(
                    group_code = %code,
                    %reference,
                    outcome = outcome.attempt_outcome().as_str(),
                    error = %e,
                    "Failed to record gateway attempt"
                );
            },
        }
    }
}
