//! Inventory ledger.
//!
//! The only writer of `reserved` and `assigned`. It speaks in hold tokens and
//! lines; it knows nothing about payments. Atomicity and per-row exclusion come
//! from the underlying [`RegistrationStore`].
//!
//! Group settlements also pass through here: a status transition and its hold
//! disposition are one store transaction, and the ledger is the component that
//! issues it.

use crate::metrics;
use chrono::{DateTime, Utc};
use racepay_core::store::{
    CommitOutcome, HoldOutcome, RegistrationStore, ReleaseOutcome, SettleOutcome, Settlement,
    StoreError,
};
use racepay_core::types::{Hold, HoldLine, HoldToken, InventoryItem, InventoryKey, merge_lines};
use std::sync::Arc;
use thiserror::Error;

/// Ledger failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A line could not be satisfied; nothing was held.
    #[error("insufficient stock for {key}: requested {requested}, available {available}")]
    InsufficientStock {
        /// Row found short
        key: InventoryKey,
        /// Units requested
        requested: u32,
        /// Units available
        available: u32,
    },

    /// A hold request without any units.
    #[error("hold request is empty")]
    EmptyRequest,

    /// No hold with this token.
    #[error("unknown hold token {0}")]
    UnknownToken(HoldToken),

    /// The hold was released and can no longer be committed.
    #[error("hold {0} was already released")]
    AlreadyReleased(HoldToken),

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Handle to the inventory ledger. Cheap to clone.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn RegistrationStore>,
}

impl Ledger {
    /// Create a ledger over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self { store }
    }

    /// Hold every line or nothing.
    ///
    /// Lines naming the same row are merged first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientStock`] if any row is short, in which
    /// case no counter changed.
    pub async fn hold(
        &self,
        lines: impl IntoIterator<Item = HoldLine>,
        at: DateTime<Utc>,
    ) -> Result<Hold, LedgerError> {
        let lines = merge_lines(lines);
        if lines.is_empty() {
            return Err(LedgerError::EmptyRequest);
        }

        match self.store.hold(HoldToken::new(), lines, at).await? {
            HoldOutcome::Held(hold) => {
                metrics::record_hold(true);
                tracing::debug!(token = %hold.token, lines = hold.lines.len(), "Inventory held");
                Ok(hold)
            },
            HoldOutcome::Insufficient {
                key,
                requested,
                available,
            } => {
                metrics::record_hold(false);
                tracing::info!(%key, requested, available, "Hold refused: insufficient stock");
                Err(LedgerError::InsufficientStock {
                    key,
                    requested,
                    available,
                })
            },
        }
    }

    /// Move a hold's units from reserved to assigned.
    ///
    /// Committing an already committed hold succeeds without changing anything.
    /// Holds owned by a group are committed through [`Ledger::settle`]
    /// instead, so that the group's status moves with them.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownToken`] or [`LedgerError::AlreadyReleased`].
    pub async fn commit(&self, token: HoldToken) -> Result<(), LedgerError> {
        match self.store.commit_hold(token).await? {
            CommitOutcome::Committed | CommitOutcome::AlreadyCommitted => Ok(()),
            CommitOutcome::AlreadyReleased => Err(LedgerError::AlreadyReleased(token)),
            CommitOutcome::UnknownHold => Err(LedgerError::UnknownToken(token)),
        }
    }

    /// Return a hold's units to available.
    ///
    /// Releasing an already released hold, or one that was committed in the
    /// meantime, succeeds without changing anything.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownToken`] if no such hold exists.
    pub async fn release(&self, token: HoldToken) -> Result<(), LedgerError> {
        match self.store.release_hold(token).await? {
            ReleaseOutcome::Released | ReleaseOutcome::AlreadyReleased => Ok(()),
            ReleaseOutcome::AlreadyCommitted => {
                tracing::debug!(%token, "Release skipped: hold already committed");
                Ok(())
            },
            ReleaseOutcome::UnknownHold => Err(LedgerError::UnknownToken(token)),
        }
    }

    /// Apply a group's conditional transition together with its hold's commit
    /// or release.
    ///
    /// A stale status or an unusable hold is reported in the
    /// [`SettleOutcome`], with nothing changed.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] if the store failed; nothing was applied.
    pub async fn settle(&self, settlement: Settlement) -> Result<SettleOutcome, StoreError> {
        let disposition = settlement.disposition;
        let outcome = self.store.settle(settlement).await?;
        if let SettleOutcome::Settled { group, hold_state } = &outcome {
            tracing::debug!(
                group_code = %group.code,
                token = %group.hold_token,
                ?disposition,
                hold_state = hold_state.as_str(),
                "Hold settled with its group"
            );
        }
        Ok(outcome)
    }

    /// Current counters of every row.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] if the store cannot be read.
    pub async fn items(&self) -> Result<Vec<InventoryItem>, LedgerError> {
        Ok(self.store.load_items().await?)
    }

    /// Create or resize a row.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] wrapping
    /// [`StoreError::StockBelowCommitted`] when shrinking below held and
    /// assigned units.
    pub async fn configure(&self, key: InventoryKey, stock: u32) -> Result<InventoryItem, LedgerError> {
        let item = self.store.configure_stock(key, stock).await?;
        tracing::info!(%key, stock, "Inventory row configured");
        Ok(item)
    }
}
