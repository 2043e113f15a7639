//! In-memory [`RegistrationStore`] for fast, deterministic tests.
//!
//! All state sits behind one mutex, so every operation is trivially atomic.
//! Failures can be injected per operation to exercise compensation paths.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use chrono::{DateTime, Utc};
use racepay_core::BoxFuture;
use racepay_core::store::{
    CommitOutcome, HoldDisposition, HoldOutcome, RegistrationStore, ReleaseOutcome,
    SettleOutcome, Settlement, StoreError,
};
use racepay_core::types::{
    GatewayAttempt, GroupCode, Hold, HoldLine, HoldState, HoldToken, InventoryItem, InventoryKey,
    PaymentStatus, RegistrationGroup, merge_lines,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// [`RegistrationStore::hold`]
    Hold,
    /// [`RegistrationStore::commit_hold`]
    CommitHold,
    /// [`RegistrationStore::release_hold`]
    ReleaseHold,
    /// [`RegistrationStore::insert_group`]
    InsertGroup,
    /// [`RegistrationStore::mark_processing`]
    MarkProcessing,
    /// [`RegistrationStore::settle`]
    Settle,
    /// [`RegistrationStore::overdue_groups`]
    OverdueGroups,
    /// [`RegistrationStore::set_notification_pending`]
    NotificationFlag,
    /// [`RegistrationStore::record_attempt`]
    RecordAttempt,
    /// [`RegistrationStore::ping`]
    Ping,
}

#[derive(Debug, Default)]
struct State {
    items: BTreeMap<InventoryKey, InventoryItem>,
    holds: HashMap<HoldToken, Hold>,
    groups: HashMap<GroupCode, RegistrationGroup>,
    attempts: Vec<GatewayAttempt>,
}

#[derive(Debug, Default)]
struct Failures {
    always: HashSet<FailPoint>,
    once: HashSet<FailPoint>,
}

/// In-memory registration store.
///
/// # Example
///
/// ```
/// use racepay_testing::{FailPoint, InMemoryRegistrationStore};
///
/// let store = InMemoryRegistrationStore::new();
/// store.fail_once(FailPoint::InsertGroup);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryRegistrationStore {
    state: Arc<Mutex<State>>,
    failures: Arc<Mutex<Failures>>,
}

impl InMemoryRegistrationStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `point` fail until [`Self::heal`].
    pub fn fail_always(&self, point: FailPoint) {
        self.failures.lock().unwrap().always.insert(point);
    }

    /// Make the next call to `point` fail.
    pub fn fail_once(&self, point: FailPoint) {
        self.failures.lock().unwrap().once.insert(point);
    }

    /// Clear every injected failure.
    pub fn heal(&self) {
        let mut failures = self.failures.lock().unwrap();
        failures.always.clear();
        failures.once.clear();
    }

    /// Current counters of one row.
    #[must_use]
    pub fn item(&self, key: InventoryKey) -> Option<InventoryItem> {
        self.state.lock().unwrap().items.get(&key).copied()
    }

    /// Snapshot of a group.
    #[must_use]
    pub fn group(&self, code: &GroupCode) -> Option<RegistrationGroup> {
        self.state.lock().unwrap().groups.get(code).cloned()
    }

    /// Snapshot of a hold.
    #[must_use]
    pub fn hold_state(&self, token: HoldToken) -> Option<HoldState> {
        self.state.lock().unwrap().holds.get(&token).map(|h| h.state)
    }

    /// Number of holds still in `held`.
    #[must_use]
    pub fn open_hold_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .holds
            .values()
            .filter(|h| h.state == HoldState::Held)
            .count()
    }

    /// Every recorded attempt, oldest first.
    #[must_use]
    pub fn all_attempts(&self) -> Vec<GatewayAttempt> {
        self.state.lock().unwrap().attempts.clone()
    }

    /// Number of stored groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.state.lock().unwrap().groups.len()
    }

    fn check(&self, point: FailPoint) -> Result<(), StoreError> {
        let mut failures = self.failures.lock().unwrap();
        if failures.always.contains(&point) || failures.once.remove(&point) {
            return Err(StoreError::Database(format!("injected failure at {point:?}")));
        }
        Ok(())
    }
}

impl State {
    fn available(&self, key: InventoryKey) -> u32 {
        self.items.get(&key).map_or(0, InventoryItem::available)
    }

    fn apply_commit(&mut self, token: HoldToken) -> CommitOutcome {
        let Some(hold) = self.holds.get_mut(&token) else {
            return CommitOutcome::UnknownHold;
        };
        match hold.state {
            HoldState::Committed => CommitOutcome::AlreadyCommitted,
            HoldState::Released => CommitOutcome::AlreadyReleased,
            HoldState::Held => {
                hold.state = HoldState::Committed;
                for line in &hold.lines {
                    if let Some(item) = self.items.get_mut(&line.key) {
                        item.reserved = item.reserved.saturating_sub(line.count);
                        item.assigned += line.count;
                    }
                }
                CommitOutcome::Committed
            },
        }
    }

    fn apply_release(&mut self, token: HoldToken) -> ReleaseOutcome {
        let Some(hold) = self.holds.get_mut(&token) else {
            return ReleaseOutcome::UnknownHold;
        };
        match hold.state {
            HoldState::Released => ReleaseOutcome::AlreadyReleased,
            HoldState::Committed => ReleaseOutcome::AlreadyCommitted,
            HoldState::Held => {
                hold.state = HoldState::Released;
                for line in &hold.lines {
                    if let Some(item) = self.items.get_mut(&line.key) {
                        item.reserved = item.reserved.saturating_sub(line.count);
                    }
                }
                ReleaseOutcome::Released
            },
        }
    }
}

impl RegistrationStore for InMemoryRegistrationStore {
    fn configure_stock(
        &self,
        key: InventoryKey,
        stock: u32,
    ) -> BoxFuture<'_, Result<InventoryItem, StoreError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let item = state
                .items
                .entry(key)
                .or_insert_with(|| InventoryItem::new(key, 0));
            let committed = item.reserved + item.assigned;
            if stock < committed {
                return Err(StoreError::StockBelowCommitted {
                    key,
                    requested: stock,
                    committed,
                });
            }
            item.stock = stock;
            Ok(*item)
        })
    }

    fn load_items(&self) -> BoxFuture<'_, Result<Vec<InventoryItem>, StoreError>> {
        Box::pin(async move { Ok(self.state.lock().unwrap().items.values().copied().collect()) })
    }

    fn hold(
        &self,
        token: HoldToken,
        lines: Vec<HoldLine>,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<HoldOutcome, StoreError>> {
        Box::pin(async move {
            self.check(FailPoint::Hold)?;
            let lines = merge_lines(lines);
            let mut state = self.state.lock().unwrap();

            if let Some(existing) = state.holds.get(&token) {
                return Ok(HoldOutcome::Held(existing.clone()));
            }

            for line in &lines {
                let available = state.available(line.key);
                if available < line.count {
                    return Ok(HoldOutcome::Insufficient {
                        key: line.key,
                        requested: line.count,
                        available,
                    });
                }
            }

            for line in &lines {
                if let Some(item) = state.items.get_mut(&line.key) {
                    item.reserved += line.count;
                }
            }

            let hold = Hold {
                token,
                lines,
                state: HoldState::Held,
                created_at: at,
            };
            state.holds.insert(token, hold.clone());
            Ok(HoldOutcome::Held(hold))
        })
    }

    fn commit_hold(&self, token: HoldToken) -> BoxFuture<'_, Result<CommitOutcome, StoreError>> {
        Box::pin(async move {
            self.check(FailPoint::CommitHold)?;
            Ok(self.state.lock().unwrap().apply_commit(token))
        })
    }

    fn release_hold(
        &self,
        token: HoldToken,
    ) -> BoxFuture<'_, Result<ReleaseOutcome, StoreError>> {
        Box::pin(async move {
            self.check(FailPoint::ReleaseHold)?;
            Ok(self.state.lock().unwrap().apply_release(token))
        })
    }

    fn load_hold(&self, token: HoldToken) -> BoxFuture<'_, Result<Option<Hold>, StoreError>> {
        Box::pin(async move { Ok(self.state.lock().unwrap().holds.get(&token).cloned()) })
    }

    fn insert_group(&self, group: RegistrationGroup) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.check(FailPoint::InsertGroup)?;
            let mut state = self.state.lock().unwrap();

            if state.groups.contains_key(&group.code) {
                return Err(StoreError::DuplicateGroup(group.code));
            }
            if let Some(key) = &group.idempotency_key {
                let owner = state.groups.values().find(|g| {
                    g.idempotency_key.as_ref() == Some(key)
                        && PaymentStatus::LIVE.contains(&g.status)
                });
                if let Some(owner) = owner {
                    return Err(StoreError::IdempotencyConflict {
                        existing: owner.code.clone(),
                    });
                }
            }

            if let Some(reference) = group.payment_method.manual_reference() {
                let taken = state.groups.values().any(|g| {
                    PaymentStatus::LIVE.contains(&g.status)
                        && g.payment_method.manual_reference() == Some(reference)
                });
                if taken {
                    return Err(StoreError::ManualReferenceInUse(reference.to_string()));
                }
            }

            state.groups.insert(group.code.clone(), group);
            Ok(())
        })
    }

    fn load_group(
        &self,
        code: &GroupCode,
    ) -> BoxFuture<'_, Result<Option<RegistrationGroup>, StoreError>> {
        let code = code.clone();
        Box::pin(async move { Ok(self.state.lock().unwrap().groups.get(&code).cloned()) })
    }

    fn find_live_by_idempotency_key(
        &self,
        key: &str,
    ) -> BoxFuture<'_, Result<Option<RegistrationGroup>, StoreError>> {
        let key = key.to_string();
        Box::pin(async move {
            Ok(self
                .state
                .lock()
                .unwrap()
                .groups
                .values()
                .find(|g| {
                    g.idempotency_key.as_deref() == Some(key.as_str())
                        && PaymentStatus::LIVE.contains(&g.status)
                })
                .cloned())
        })
    }

    fn mark_processing(
        &self,
        code: &GroupCode,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool, StoreError>> {
        let code = code.clone();
        Box::pin(async move {
            self.check(FailPoint::MarkProcessing)?;
            let mut state = self.state.lock().unwrap();
            match state.groups.get_mut(&code) {
                Some(group) if group.status == PaymentStatus::Pending => {
                    group.status = PaymentStatus::Processing;
                    group.updated_at = at;
                    Ok(true)
                },
                _ => Ok(false),
            }
        })
    }

    fn settle(&self, settlement: Settlement) -> BoxFuture<'_, Result<SettleOutcome, StoreError>> {
        Box::pin(async move {
            self.check(FailPoint::Settle)?;
            let mut state = self.state.lock().unwrap();

            let Some(group) = state.groups.get(&settlement.code) else {
                return Ok(SettleOutcome::NotFound);
            };
            if !settlement.expected.contains(&group.status) {
                return Ok(SettleOutcome::Stale {
                    current: group.status,
                });
            }
            let token = group.hold_token;
            let Some(hold_state) = state.holds.get(&token).map(|h| h.state) else {
                return Err(StoreError::Database(format!(
                    "hold {token} of group {} is missing",
                    settlement.code
                )));
            };

            let hold_state = match (settlement.disposition, hold_state) {
                (HoldDisposition::Commit, HoldState::Released)
                | (HoldDisposition::Release, HoldState::Committed) => {
                    return Ok(SettleOutcome::HoldUnavailable { state: hold_state });
                },
                (HoldDisposition::Commit, _) => {
                    state.apply_commit(token);
                    HoldState::Committed
                },
                (HoldDisposition::Release, _) => {
                    state.apply_release(token);
                    HoldState::Released
                },
            };

            let Some(group) = state.groups.get_mut(&settlement.code) else {
                return Ok(SettleOutcome::NotFound);
            };
            group.status = settlement.to;
            group.updated_at = settlement.at;
            if settlement.to == PaymentStatus::Confirmed {
                group.confirmed_at = Some(settlement.at);
            }
            if let Some(reference) = settlement.gateway_reference {
                group.gateway_reference = Some(reference);
            }

            Ok(SettleOutcome::Settled {
                group: Box::new(group.clone()),
                hold_state,
            })
        })
    }

    fn overdue_groups(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<RegistrationGroup>, StoreError>> {
        Box::pin(async move {
            self.check(FailPoint::OverdueGroups)?;
            let state = self.state.lock().unwrap();
            let mut overdue: Vec<_> = state
                .groups
                .values()
                .filter(|g| {
                    PaymentStatus::OPEN.contains(&g.status)
                        && g.is_overdue(now)
                        && state.holds.get(&g.hold_token).map(|h| h.state)
                            != Some(HoldState::Committed)
                })
                .cloned()
                .collect();
            overdue.sort_by_key(|g| g.reserved_until);
            overdue.truncate(limit);
            Ok(overdue)
        })
    }

    fn set_notification_pending(
        &self,
        code: &GroupCode,
        pending: bool,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let code = code.clone();
        Box::pin(async move {
            self.check(FailPoint::NotificationFlag)?;
            if let Some(group) = self.state.lock().unwrap().groups.get_mut(&code) {
                group.notification_pending = pending;
            }
            Ok(())
        })
    }

    fn record_attempt(&self, attempt: GatewayAttempt) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.check(FailPoint::RecordAttempt)?;
            let mut state = self.state.lock().unwrap();
            if state.attempts.iter().any(|a| a.reference == attempt.reference) {
                return Err(StoreError::DuplicateReference(attempt.reference));
            }
            state.attempts.push(attempt);
            Ok(())
        })
    }

    fn attempts_for(
        &self,
        code: &GroupCode,
    ) -> BoxFuture<'_, Result<Vec<GatewayAttempt>, StoreError>> {
        let code = code.clone();
        Box::pin(async move {
            Ok(self
                .state
                .lock()
                .unwrap()
                .attempts
                .iter()
                .filter(|a| a.group_code == code)
                .cloned()
                .collect())
        })
    }

    fn reference_exists(&self, reference: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let reference = reference.to_string();
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            let attempted = state.attempts.iter().any(|a| a.reference == reference);
            let manual = state.groups.values().any(|g| {
                !matches!(g.status, PaymentStatus::Rejected | PaymentStatus::Expired)
                    && g.payment_method.manual_reference() == Some(reference.as_str())
            });
            Ok(attempted || manual)
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move { self.check(FailPoint::Ping) })
    }
}
