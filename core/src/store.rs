//! Persistence contract for inventory, registration groups and gateway attempts.
//!
//! # Design
//!
//! The store is the only place inventory counters and group statuses are
//! written. It owes its callers three guarantees:
//!
//! - **Atomic holds**: a multi-line hold either reserves every line or changes
//!   nothing, and two concurrent holds can never both take the last unit of a
//!   row. Exclusion is per row, never store-wide.
//! - **Idempotent dispositions**: committing or releasing a hold twice is a
//!   no-op the second time.
//! - **Settlement as one unit**: a group's status transition and its hold's
//!   commit/release are applied together or not at all, and only when the group
//!   is still in one of the expected statuses.
//!
//! # Implementations
//!
//! - `PostgresRegistrationStore` (in `racepay-postgres`): production, row locks
//!   and conditional updates inside transactions
//! - `InMemoryRegistrationStore` (in `racepay-testing`): fast, deterministic tests
//!
//! # Dyn Compatibility
//!
//! Methods return [`BoxFuture`] so the store can be shared as
//! `Arc<dyn RegistrationStore>`.

use crate::types::{
    GatewayAttempt, GroupCode, Hold, HoldLine, HoldState, HoldToken, InventoryItem, InventoryKey,
    PaymentStatus, RegistrationGroup,
};
use crate::BoxFuture;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Another live group already owns this idempotency key.
    #[error("idempotency key already bound to group {existing}")]
    IdempotencyConflict {
        /// Group currently owning the key
        existing: GroupCode,
    },

    /// A gateway attempt with this reference was already recorded.
    #[error("reference already recorded: {0}")]
    DuplicateReference(String),

    /// A group that was neither rejected nor expired already paid with this
    /// manual reference.
    #[error("manual payment reference already in use: {0}")]
    ManualReferenceInUse(String),

    /// A group with this code already exists.
    #[error("group already exists: {0}")]
    DuplicateGroup(GroupCode),

    /// Stock cannot be configured below the units already held or assigned.
    #[error("stock {requested} for {key} is below committed units {committed}")]
    StockBelowCommitted {
        /// Row being configured
        key: InventoryKey,
        /// Requested stock
        requested: u32,
        /// `reserved + assigned`
        committed: u32,
    },

    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result of a hold request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldOutcome {
    /// Every line was reserved.
    Held(Hold),
    /// At least one line could not be reserved; nothing changed.
    Insufficient {
        /// First row found short
        key: InventoryKey,
        /// Units requested on that row
        requested: u32,
        /// Units available on that row
        available: u32,
    },
}

/// Result of committing a hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Units moved from `reserved` to `assigned`.
    Committed,
    /// Already committed; nothing changed.
    AlreadyCommitted,
    /// The hold was released earlier and cannot be committed.
    AlreadyReleased,
    /// No hold with this token.
    UnknownHold,
}

/// Result of releasing a hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Units returned to available.
    Released,
    /// Already released; nothing changed.
    AlreadyReleased,
    /// The hold was committed; nothing changed.
    AlreadyCommitted,
    /// No hold with this token.
    UnknownHold,
}

/// What to do with a group's hold when it settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldDisposition {
    /// Convert the hold into assigned inventory.
    Commit,
    /// Return the held units.
    Release,
}

/// A conditional group transition paired with its hold disposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// Group to settle
    pub code: GroupCode,
    /// Statuses the group must currently be in
    pub expected: Vec<PaymentStatus>,
    /// Status to move to
    pub to: PaymentStatus,
    /// Hold disposition applied in the same unit
    pub disposition: HoldDisposition,
    /// Transition time; becomes `confirmed_at` when `to` is confirmed
    pub at: DateTime<Utc>,
    /// Approved gateway reference to record, if any
    pub gateway_reference: Option<String>,
}

/// Result of a settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Status changed and the hold reached `hold_state`.
    Settled {
        /// Group after the transition
        group: Box<RegistrationGroup>,
        /// Hold state after the disposition
        hold_state: HoldState,
    },
    /// The group was no longer in an expected status; nothing changed.
    Stale {
        /// Status found
        current: PaymentStatus,
    },
    /// The hold could not take the disposition (e.g. committing a released
    /// hold); nothing changed.
    HoldUnavailable {
        /// Hold state found
        state: HoldState,
    },
    /// No such group.
    NotFound,
}

/// Transactional store behind the ledger, orchestrator and sweeper.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; every method is safe to call
/// concurrently.
pub trait RegistrationStore: Send + Sync {
    // ------------------------------------------------------------------ inventory

    /// Create or resize an inventory row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StockBelowCommitted`] when shrinking below the units
    /// already reserved or assigned.
    fn configure_stock(
        &self,
        key: InventoryKey,
        stock: u32,
    ) -> BoxFuture<'_, Result<InventoryItem, StoreError>>;

    /// All inventory rows, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    fn load_items(&self) -> BoxFuture<'_, Result<Vec<InventoryItem>, StoreError>>;

    /// Reserve every line or nothing.
    ///
    /// `lines` are expected merged (one per row, positive counts). Unknown rows
    /// count as zero stock.
    ///
    /// # Errors
    ///
    /// Returns error only for infrastructure failures; shortage is a
    /// [`HoldOutcome::Insufficient`].
    fn hold(
        &self,
        token: HoldToken,
        lines: Vec<HoldLine>,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<HoldOutcome, StoreError>>;

    /// Move a hold's units from `reserved` to `assigned`.
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails.
    fn commit_hold(&self, token: HoldToken) -> BoxFuture<'_, Result<CommitOutcome, StoreError>>;

    /// Return a hold's units to available.
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails.
    fn release_hold(&self, token: HoldToken)
    -> BoxFuture<'_, Result<ReleaseOutcome, StoreError>>;

    /// Load a hold.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    fn load_hold(&self, token: HoldToken) -> BoxFuture<'_, Result<Option<Hold>, StoreError>>;

    // ------------------------------------------------------------------ groups

    /// Persist a new group.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IdempotencyConflict`] when a pending, processing or
    /// confirmed group already owns the group's idempotency key, and
    /// [`StoreError::ManualReferenceInUse`] when such a group already paid with
    /// the same manual reference.
    fn insert_group(&self, group: RegistrationGroup) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Load a group by code.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    fn load_group(
        &self,
        code: &GroupCode,
    ) -> BoxFuture<'_, Result<Option<RegistrationGroup>, StoreError>>;

    /// The pending, processing or confirmed group owning `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    fn find_live_by_idempotency_key(
        &self,
        key: &str,
    ) -> BoxFuture<'_, Result<Option<RegistrationGroup>, StoreError>>;

    /// Move a group from `pending` to `processing`.
    ///
    /// Returns `false` if the group was not pending.
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails.
    fn mark_processing(
        &self,
        code: &GroupCode,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool, StoreError>>;

    /// Apply a conditional transition and its hold disposition as one unit.
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails; nothing is applied then.
    fn settle(&self, settlement: Settlement) -> BoxFuture<'_, Result<SettleOutcome, StoreError>>;

    /// Pending/processing groups whose window closed before `now`, oldest first.
    ///
    /// Groups whose hold is already committed are left out: releasing it is
    /// impossible, so listing them would only crowd out groups that can expire.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    fn overdue_groups(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<RegistrationGroup>, StoreError>>;

    /// Set or clear the owed-confirmation flag.
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails.
    fn set_notification_pending(
        &self,
        code: &GroupCode,
        pending: bool,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    // ------------------------------------------------------------------ attempts

    /// Append a gateway attempt to a group's audit trail.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateReference`] if the reference was recorded
    /// before.
    fn record_attempt(&self, attempt: GatewayAttempt) -> BoxFuture<'_, Result<(), StoreError>>;

    /// A group's attempts, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    fn attempts_for(
        &self,
        code: &GroupCode,
    ) -> BoxFuture<'_, Result<Vec<GatewayAttempt>, StoreError>>;

    /// Whether `reference` was used by any gateway attempt or by the manual
    /// payment of a group that was not rejected or expired.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    fn reference_exists(&self, reference: &str) -> BoxFuture<'_, Result<bool, StoreError>>;

    /// Cheap connectivity check.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>>;
}
