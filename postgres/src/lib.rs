//! `PostgreSQL` registration store for racepay.
//!
//! This crate provides the production implementation of
//! [`RegistrationStore`] from `racepay-core`. It uses sqlx runtime queries and
//! guarantees:
//!
//! - All-or-nothing holds that never oversell a row, even under concurrent
//!   requests for the last unit
//! - Idempotent hold commit/release
//! - Group settlement (status transition plus hold disposition) in one transaction
//! - Idempotency keys unique among live groups only (partial unique index)
//!
//! # Example
//!
//! ```no_run
//! use racepay_postgres::PostgresRegistrationStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresRegistrationStore::connect("postgres://localhost/racepay", 10, 30).await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

mod attempts;
mod groups;
mod inventory;
mod rows;

use chrono::{DateTime, Utc};
use racepay_core::BoxFuture;
use racepay_core::store::{
    CommitOutcome, HoldOutcome, RegistrationStore, ReleaseOutcome, SettleOutcome, Settlement,
    StoreError,
};
use racepay_core::types::{
    GatewayAttempt, GroupCode, Hold, HoldLine, HoldToken, InventoryItem, InventoryKey,
    RegistrationGroup,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// `PostgreSQL`-backed [`RegistrationStore`].
#[derive(Clone, Debug)]
pub struct PostgresRegistrationStore {
    pool: PgPool,
}

impl PostgresRegistrationStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a bounded pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if no connection can be established
    /// within `connect_timeout_secs`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(rows::db_error)?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns error if migrations fail.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }
}

impl RegistrationStore for PostgresRegistrationStore {
    fn configure_stock(
        &self,
        key: InventoryKey,
        stock: u32,
    ) -> BoxFuture<'_, Result<InventoryItem, StoreError>> {
        Box::pin(inventory::configure_stock(&self.pool, key, stock))
    }

    fn load_items(&self) -> BoxFuture<'_, Result<Vec<InventoryItem>, StoreError>> {
        Box::pin(inventory::load_items(&self.pool))
    }

    fn hold(
        &self,
        token: HoldToken,
        lines: Vec<HoldLine>,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<HoldOutcome, StoreError>> {
        Box::pin(inventory::hold(&self.pool, token, lines, at))
    }

    fn commit_hold(&self, token: HoldToken) -> BoxFuture<'_, Result<CommitOutcome, StoreError>> {
        Box::pin(inventory::commit_hold(&self.pool, token))
    }

    fn release_hold(
        &self,
        token: HoldToken,
    ) -> BoxFuture<'_, Result<ReleaseOutcome, StoreError>> {
        Box::pin(inventory::release_hold(&self.pool, token))
    }

    fn load_hold(&self, token: HoldToken) -> BoxFuture<'_, Result<Option<Hold>, StoreError>> {
        Box::pin(inventory::load_hold(&self.pool, token))
    }

    fn insert_group(&self, group: RegistrationGroup) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(groups::insert_group(&self.pool, group))
    }

    fn load_group(
        &self,
        code: &GroupCode,
    ) -> BoxFuture<'_, Result<Option<RegistrationGroup>, StoreError>> {
        let code = code.clone();
        Box::pin(async move { groups::load_group(&self.pool, &code).await })
    }

    fn find_live_by_idempotency_key(
        &self,
        key: &str,
    ) -> BoxFuture<'_, Result<Option<RegistrationGroup>, StoreError>> {
        let key = key.to_string();
        Box::pin(async move { groups::find_live_by_idempotency_key(&self.pool, &key).await })
    }

    fn mark_processing(
        &self,
        code: &GroupCode,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool, StoreError>> {
        let code = code.clone();
        Box::pin(async move { groups::mark_processing(&self.pool, &code, at).await })
    }

    fn settle(&self, settlement: Settlement) -> BoxFuture<'_, Result<SettleOutcome, StoreError>> {
        Box::pin(groups::settle(&self.pool, settlement))
    }

    fn overdue_groups(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<RegistrationGroup>, StoreError>> {
        Box::pin(groups::overdue_groups(&self.pool, now, limit))
    }

    fn set_notification_pending(
        &self,
        code: &GroupCode,
        pending: bool,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let code = code.clone();
        Box::pin(async move { groups::set_notification_pending(&self.pool, &code, pending).await })
    }

    fn record_attempt(&self, attempt: GatewayAttempt) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(attempts::record_attempt(&self.pool, attempt))
    }

    fn attempts_for(
        &self,
        code: &GroupCode,
    ) -> BoxFuture<'_, Result<Vec<GatewayAttempt>, StoreError>> {
        let code = code.clone();
        Box::pin(async move { attempts::attempts_for(&self.pool, &code).await })
    }

    fn reference_exists(&self, reference: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let reference = reference.to_string();
        Box::pin(async move { attempts::reference_exists(&self.pool, &reference).await })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map(|_| ())
                .map_err(rows::db_error)
        })
    }
}
