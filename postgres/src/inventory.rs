//! Inventory rows and holds.
//!
//! Every multi-row operation touches rows in key order, and the hold-taking
//! update only succeeds while `stock - reserved - assigned` covers the request.
//! Two transactions racing for the last unit therefore serialize on the row
//! lock, and the loser's update matches nothing.

use crate::rows::{
    HOLD_COLUMNS, ITEM_COLUMNS, db_error, from_db_count, hold_from_row, item_from_row,
    to_db_count,
};
use chrono::{DateTime, Utc};
use racepay_core::store::{CommitOutcome, HoldOutcome, ReleaseOutcome, StoreError};
use racepay_core::types::{Hold, HoldLine, HoldState, HoldToken, InventoryItem, InventoryKey, merge_lines};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

pub(crate) async fn configure_stock(
    pool: &PgPool,
    key: InventoryKey,
    stock: u32,
) -> Result<InventoryItem, StoreError> {
    let sql = format!(
        r"
        INSERT INTO inventory_items (size, gender, stock)
        VALUES ($1, $2, $3)
        ON CONFLICT (size, gender) DO UPDATE
            SET stock = EXCLUDED.stock
            WHERE inventory_items.reserved + inventory_items.assigned <= EXCLUDED.stock
        RETURNING {ITEM_COLUMNS}
        "
    );
    let row = sqlx::query(&sql)
        .bind(key.size.as_str())
        .bind(key.gender.as_str())
        .bind(to_db_count(stock)?)
        .fetch_optional(pool)
        .await
        .map_err(db_error)?;

    if let Some(row) = row {
        let item = item_from_row(&row)?;
        tracing::info!(key = %key, stock, "Inventory row configured");
        return Ok(item);
    }

    let committed = load_item(pool, key)
        .await?
        .map_or(0, |item| item.reserved + item.assigned);
    Err(StoreError::StockBelowCommitted {
        key,
        requested: stock,
        committed,
    })
}

async fn load_item(pool: &PgPool, key: InventoryKey) -> Result<Option<InventoryItem>, StoreError> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM inventory_items WHERE size = $1 AND gender = $2");
    sqlx::query(&sql)
        .bind(key.size.as_str())
        .bind(key.gender.as_str())
        .fetch_optional(pool)
        .await
        .map_err(db_error)?
        .as_ref()
        .map(item_from_row)
        .transpose()
}

pub(crate) async fn load_items(pool: &PgPool) -> Result<Vec<InventoryItem>, StoreError> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM inventory_items");
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .map_err(db_error)?;

    let mut items = rows
        .iter()
        .map(item_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    items.sort_by_key(|item| item.key);
    Ok(items)
}

pub(crate) async fn hold(
    pool: &PgPool,
    token: HoldToken,
    lines: Vec<HoldLine>,
    at: DateTime<Utc>,
) -> Result<HoldOutcome, StoreError> {
    let lines = merge_lines(lines);
    let mut tx = pool.begin().await.map_err(db_error)?;

    if let Some(existing) = fetch_hold(&mut tx, token, false).await? {
        tx.commit().await.map_err(db_error)?;
        return Ok(HoldOutcome::Held(existing));
    }

    for line in &lines {
        let count = to_db_count(line.count)?;
        let updated = sqlx::query(
            r"
            UPDATE inventory_items
            SET reserved = reserved + $3
            WHERE size = $1 AND gender = $2
              AND stock - reserved - assigned >= $3
            ",
        )
        .bind(line.key.size.as_str())
        .bind(line.key.gender.as_str())
        .bind(count)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if updated.rows_affected() == 0 {
            let available: Option<i32> = sqlx::query_scalar(
                "SELECT stock - reserved - assigned FROM inventory_items WHERE size = $1 AND gender = $2",
            )
            .bind(line.key.size.as_str())
            .bind(line.key.gender.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;
            tx.rollback().await.map_err(db_error)?;

            return Ok(HoldOutcome::Insufficient {
                key: line.key,
                requested: line.count,
                available: available.map_or(Ok(0), from_db_count)?,
            });
        }
    }

    sqlx::query(
        r"
        INSERT INTO inventory_holds (token, lines, state, created_at, updated_at)
        VALUES ($1, $2, 'held', $3, $3)
        ",
    )
    .bind(*token.as_uuid())
    .bind(Json(&lines))
    .bind(at)
    .execute(&mut *tx)
    .await
    .map_err(db_error)?;

    tx.commit().await.map_err(db_error)?;

    tracing::debug!(token = %token, lines = lines.len(), "Inventory held");

    Ok(HoldOutcome::Held(Hold {
        token,
        lines,
        state: HoldState::Held,
        created_at: at,
    }))
}

pub(crate) async fn load_hold(pool: &PgPool, token: HoldToken) -> Result<Option<Hold>, StoreError> {
    let mut conn = pool.acquire().await.map_err(db_error)?;
    fetch_hold(&mut conn, token, false).await
}

/// Load a hold, optionally taking its row lock.
pub(crate) async fn fetch_hold(
    conn: &mut PgConnection,
    token: HoldToken,
    lock: bool,
) -> Result<Option<Hold>, StoreError> {
    let sql = format!(
        "SELECT {HOLD_COLUMNS} FROM inventory_holds WHERE token = $1{}",
        if lock { " FOR UPDATE" } else { "" }
    );
    sqlx::query(&sql)
        .bind(*token.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?
        .as_ref()
        .map(hold_from_row)
        .transpose()
}

/// Move a locked `held` hold to `to`, adjusting its rows' counters.
pub(crate) async fn transition_hold(
    conn: &mut PgConnection,
    hold: &Hold,
    to: HoldState,
) -> Result<(), StoreError> {
    let counters = match to {
        HoldState::Committed => "reserved = reserved - $3, assigned = assigned + $3",
        HoldState::Released | HoldState::Held => "reserved = reserved - $3",
    };
    let sql = format!("UPDATE inventory_items SET {counters} WHERE size = $1 AND gender = $2");

    for line in &hold.lines {
        sqlx::query(&sql)
            .bind(line.key.size.as_str())
            .bind(line.key.gender.as_str())
            .bind(to_db_count(line.count)?)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
    }

    sqlx::query("UPDATE inventory_holds SET state = $2, updated_at = NOW() WHERE token = $1")
        .bind(*hold.token.as_uuid())
        .bind(to.as_str())
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

    Ok(())
}

pub(crate) async fn commit_hold(pool: &PgPool, token: HoldToken) -> Result<CommitOutcome, StoreError> {
    let mut tx = pool.begin().await.map_err(db_error)?;

    let outcome = match fetch_hold(&mut tx, token, true).await? {
        None => CommitOutcome::UnknownHold,
        Some(hold) => match hold.state {
            HoldState::Committed => CommitOutcome::AlreadyCommitted,
            HoldState::Released => CommitOutcome::AlreadyReleased,
            HoldState::Held => {
                transition_hold(&mut tx, &hold, HoldState::Committed).await?;
                CommitOutcome::Committed
            },
        },
    };

    tx.commit().await.map_err(db_error)?;
    Ok(outcome)
}

pub(crate) async fn release_hold(
    pool: &PgPool,
    token: HoldToken,
) -> Result<ReleaseOutcome, StoreError> {
    let mut tx = pool.begin().await.map_err(db_error)?;

    let outcome = match fetch_hold(&mut tx, token, true).await? {
        None => ReleaseOutcome::UnknownHold,
        Some(hold) => match hold.state {
            HoldState::Released => ReleaseOutcome::AlreadyReleased,
            HoldState::Committed => ReleaseOutcome::AlreadyCommitted,
            HoldState::Held => {
                transition_hold(&mut tx, &hold, HoldState::Released).await?;
                ReleaseOutcome::Released
            },
        },
    };

    tx.commit().await.map_err(db_error)?;
    Ok(outcome)
}
