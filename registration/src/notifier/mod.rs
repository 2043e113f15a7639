//! Confirmation notifier.
//!
//! [`Notifier`] is a cheap handle to a bounded queue; [`NotifierWorker`]
//! drains it. Delivery retries transient dispatch failures with backoff. A
//! confirmation that cannot be delivered never touches payment state: the
//! group stays confirmed and is flagged `notification_pending` for a manual
//! [`Notifier::resend`].

pub mod console;
pub mod webhook;

pub use console::ConsoleDispatcher;
pub use webhook::WebhookDispatcher;

use crate::metrics;
use racepay_core::dispatch::{DispatchError, MessageDispatcher, OutboundMessage};
use racepay_core::store::{RegistrationStore, StoreError};
use racepay_core::types::{GroupCode, PaymentStatus, RegistrationGroup};
use racepay_runtime::RetryPolicy;
use racepay_runtime::retry::retry_with_predicate;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

/// Template name of the confirmation message.
pub const CONFIRMATION_TEMPLATE: &str = "registration_confirmed";

/// Notification failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// No such group.
    #[error("registration {0} not found")]
    GroupNotFound(GroupCode),

    /// Only confirmed groups get a confirmation.
    #[error("registration {code} is {status}, not confirmed")]
    NotConfirmed {
        /// Group
        code: GroupCode,
        /// Its current status
        status: PaymentStatus,
    },

    /// Every delivery attempt failed.
    #[error("confirmation undelivered after {attempts} attempts: {error}")]
    Undelivered {
        /// Attempts made
        attempts: u32,
        /// Last dispatch error
        error: DispatchError,
    },

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Build the confirmation message for a confirmed group.
#[must_use]
pub fn confirmation_message(group: &RegistrationGroup) -> OutboundMessage {
    let runners: Vec<_> = group
        .runners
        .iter()
        .map(|runner| {
            json!({
                "full_name": runner.full_name,
                "size": runner.size,
                "gender": runner.gender,
            })
        })
        .collect();

    OutboundMessage {
        recipient: group.registrant.email.clone(),
        template: CONFIRMATION_TEMPLATE.to_string(),
        payload: json!({
            "group_code": group.code,
            "registrant": group.registrant.name,
            "runners": runners,
            "amount": group.amount.to_string(),
            "payment_method": group.payment_method.kind(),
            "gateway_reference": group.gateway_reference,
            "confirmed_at": group.confirmed_at,
        }),
    }
}

struct Delivery {
    store: Arc<dyn RegistrationStore>,
    dispatcher: Arc<dyn MessageDispatcher>,
    delivery_policy: RetryPolicy,
    resend_policy: RetryPolicy,
}

impl Delivery {
    async fn dispatch(
        &self,
        group: &RegistrationGroup,
        policy: &RetryPolicy,
    ) -> Result<(), NotifyError> {
        let message = confirmation_message(group);
        retry_with_predicate(
            policy,
            || self.dispatcher.send(message.clone()),
            DispatchError::is_transient,
        )
        .await
        .map_err(|e| NotifyError::Undelivered {
            attempts: e.attempts(),
            error: e.into_error(),
        })
    }

    async fn flag(&self, code: &GroupCode, pending: bool) {
        if let Err(e) = self.store.set_notification_pending(code, pending).await {
            tracing::error!(group_code = %code, pending, error = %e, "Failed to update notification flag");
        }
    }

    /// Queued delivery. Never fails; failures end up in the flag.
    async fn deliver(&self, code: &GroupCode) {
        let group = match self.store.load_group(code).await {
            Ok(Some(group)) => group,
            Ok(None) => {
                tracing::warn!(group_code = %code, "Confirmation skipped: group not found");
                return;
            },
            Err(e) => {
                tracing::warn!(group_code = %code, error = %e, "Confirmation deferred: group unreadable");
                metrics::record_notification("failed");
                self.flag(code, true).await;
                return;
            },
        };

        if group.status != PaymentStatus::Confirmed {
            tracing::debug!(group_code = %code, status = %group.status, "Confirmation skipped: group not confirmed");
            return;
        }

        match self.dispatch(&group, &self.delivery_policy).await {
            Ok(()) => {
                metrics::record_notification("sent");
                tracing::info!(group_code = %code, recipient = %group.registrant.email, "Confirmation sent");
                if group.notification_pending {
                    self.flag(code, false).await;
                }
            },
            Err(e) => {
                metrics::record_notification("failed");
                tracing::warn!(
                    group_code = %code,
                    error = %e,
                    "Confirmation undelivered; flagged for manual resend"
                );
                self.flag(code, true).await;
            },
        }
    }
}

/// Handle used to queue confirmations and trigger resends. Cheap to clone.
#[derive(Clone)]
pub struct Notifier {
    sender: mpsc::Sender<GroupCode>,
    delivery: Arc<Delivery>,
}

impl Notifier {
    /// Create a notifier and the worker that drains its queue.
    #[must_use]
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        dispatcher: Arc<dyn MessageDispatcher>,
        queue_capacity: usize,
        delivery_policy: RetryPolicy,
        resend_policy: RetryPolicy,
    ) -> (Self, NotifierWorker) {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let delivery = Arc::new(Delivery {
            store,
            dispatcher,
            delivery_policy,
            resend_policy,
        });

        let notifier = Self {
            sender,
            delivery: Arc::clone(&delivery),
        };
        (notifier, NotifierWorker { receiver, delivery })
    }

    /// Queue a confirmation for a confirmed group without waiting for it.
    ///
    /// If the queue is full or the worker is gone, the group is flagged
    /// `notification_pending` instead.
    pub async fn notify(&self, code: &GroupCode) {
        match self.sender.try_send(code.clone()) {
            Ok(()) => tracing::debug!(group_code = %code, "Confirmation queued"),
            Err(TrySendError::Full(_) | TrySendError::Closed(_)) => {
                metrics::record_notification("deferred");
                tracing::warn!(group_code = %code, "Confirmation queue unavailable; flagged for manual resend");
                self.delivery.flag(code, true).await;
            },
        }
    }

    /// Operator-triggered resend with its own attempt bound.
    ///
    /// Clears `notification_pending` on success.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::GroupNotFound`], [`NotifyError::NotConfirmed`],
    /// [`NotifyError::Undelivered`] once every attempt failed, or
    /// [`NotifyError::Store`].
    pub async fn resend(&self, code: &GroupCode) -> Result<(), NotifyError> {
        let group = self
            .delivery
            .store
            .load_group(code)
            .await?
            .ok_or_else(|| NotifyError::GroupNotFound(code.clone()))?;

        if group.status != PaymentStatus::Confirmed {
            return Err(NotifyError::NotConfirmed {
                code: code.clone(),
                status: group.status,
            });
        }

        match self.delivery.dispatch(&group, &self.delivery.resend_policy).await {
            Ok(()) => {
                metrics::record_notification("resent");
                tracing::info!(group_code = %code, "Confirmation resent");
                self.delivery.store.set_notification_pending(code, false).await?;
                Ok(())
            },
            Err(e) => {
                metrics::record_notification("failed");
                tracing::warn!(group_code = %code, error = %e, "Manual resend failed");
                self.delivery.flag(code, true).await;
                Err(e)
            },
        }
    }
}

/// Background task draining the confirmation queue.
pub struct NotifierWorker {
    receiver: mpsc::Receiver<GroupCode>,
    delivery: Arc<Delivery>,
}

impl NotifierWorker {
    /// Deliver queued confirmations until `shutdown` flips, then drain what is
    /// already queued and stop.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Confirmation notifier started");

        while !*shutdown.borrow() {
            tokio::select! {
                job = self.receiver.recv() => match job {
                    Some(code) => self.delivery.deliver(&code).await,
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.receiver.close();
        let mut drained = 0_u32;
        while let Some(code) = self.receiver.recv().await {
            self.delivery.deliver(&code).await;
            drained += 1;
        }

        tracing::info!(drained, "Confirmation notifier stopped");
    }
}
