//! Registration groups and settlement.

use crate::inventory::{fetch_hold, transition_hold};
use crate::rows::{GROUP_COLUMNS, db_error, group_from_row, to_db_cents, violated_constraint};
use chrono::{DateTime, Utc};
use racepay_core::store::{HoldDisposition, SettleOutcome, Settlement, StoreError};
use racepay_core::types::{
    GroupCode, HoldState, HoldToken, PaymentStatus, RegistrationGroup, UnknownVariant,
};
use sqlx::types::Json;
use sqlx::{PgPool, Row};

const LIVE_KEY_INDEX: &str = "registration_groups_live_idempotency_key";
const GROUP_PKEY: &str = "registration_groups_pkey";
const LIVE_MANUAL_REFERENCE_INDEX: &str = "registration_groups_live_manual_reference";

fn status_labels(statuses: &[PaymentStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

pub(crate) async fn insert_group(pool: &PgPool, group: RegistrationGroup) -> Result<(), StoreError> {
    let result = sqlx::query(
        r"
        INSERT INTO registration_groups (
            code, idempotency_key, registrant, runners, payment_method, manual_reference,
            status, hold_token, amount_cents, reserved_until, gateway_reference,
            confirmed_at, notification_pending, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ",
    )
    .bind(group.code.as_str())
    .bind(group.idempotency_key.as_deref())
    .bind(Json(&group.registrant))
    .bind(Json(&group.runners))
    .bind(Json(&group.payment_method))
    .bind(group.payment_method.manual_reference())
    .bind(group.status.as_str())
    .bind(*group.hold_token.as_uuid())
    .bind(to_db_cents(group.amount)?)
    .bind(group.reserved_until)
    .bind(group.gateway_reference.as_deref())
    .bind(group.confirmed_at)
    .bind(group.notification_pending)
    .bind(group.created_at)
    .bind(group.updated_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) if violated_constraint(&e) == Some(LIVE_KEY_INDEX) => {
            metrics::counter!("racepay_store_conflicts_total", "kind" => "idempotency_key")
                .increment(1);
            let key = group.idempotency_key.unwrap_or_default();
            match find_live_by_idempotency_key(pool, &key).await? {
                Some(owner) => Err(StoreError::IdempotencyConflict {
                    existing: owner.code,
                }),
                None => Err(StoreError::Database(format!(
                    "idempotency key {key} conflicted with a group that is no longer live"
                ))),
            }
        },
        Err(e) if violated_constraint(&e) == Some(LIVE_MANUAL_REFERENCE_INDEX) => {
            metrics::counter!("racepay_store_conflicts_total", "kind" => "manual_reference")
                .increment(1);
            let reference = group.payment_method.manual_reference().unwrap_or_default();
            Err(StoreError::ManualReferenceInUse(reference.to_string()))
        },
        Err(e) if violated_constraint(&e) == Some(GROUP_PKEY) => {
            Err(StoreError::DuplicateGroup(group.code))
        },
        Err(e) => Err(db_error(e)),
    }
}

pub(crate) async fn load_group(
    pool: &PgPool,
    code: &GroupCode,
) -> Result<Option<RegistrationGroup>, StoreError> {
    let sql = format!("SELECT {GROUP_COLUMNS} FROM registration_groups WHERE code = $1");
    sqlx::query(&sql)
        .bind(code.as_str())
        .fetch_optional(pool)
        .await
        .map_err(db_error)?
        .as_ref()
        .map(group_from_row)
        .transpose()
}

pub(crate) async fn find_live_by_idempotency_key(
    pool: &PgPool,
    key: &str,
) -> Result<Option<RegistrationGroup>, StoreError> {
    let sql = format!(
        "SELECT {GROUP_COLUMNS} FROM registration_groups \
         WHERE idempotency_key = $1 AND status = ANY($2)"
    );
    sqlx::query(&sql)
        .bind(key)
        .bind(status_labels(&PaymentStatus::LIVE))
        .fetch_optional(pool)
        .await
        .map_err(db_error)?
        .as_ref()
        .map(group_from_row)
        .transpose()
}

pub(crate) async fn mark_processing(
    pool: &PgPool,
    code: &GroupCode,
    at: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r"
        UPDATE registration_groups
        SET status = 'processing', updated_at = $2
        WHERE code = $1 AND status = 'pending'
        ",
    )
    .bind(code.as_str())
    .bind(at)
    .execute(pool)
    .await
    .map_err(db_error)?;

    Ok(result.rows_affected() == 1)
}

/// Lock order is group row, then hold row, then inventory rows; every path
/// that locks more than one of them follows it.
pub(crate) async fn settle(pool: &PgPool, settlement: Settlement) -> Result<SettleOutcome, StoreError> {
    let mut tx = pool.begin().await.map_err(db_error)?;

    let locked = sqlx::query(
        "SELECT status, hold_token FROM registration_groups WHERE code = $1 FOR UPDATE",
    )
    .bind(settlement.code.as_str())
    .fetch_optional(&mut *tx)
    .await
    .map_err(db_error)?;

    let Some(locked) = locked else {
        tx.rollback().await.map_err(db_error)?;
        return Ok(SettleOutcome::NotFound);
    };
    let status: String = locked.try_get("status").map_err(db_error)?;
    let current: PaymentStatus = status
        .parse()
        .map_err(|e: UnknownVariant| StoreError::Serialization(e.to_string()))?;
    if !settlement.expected.contains(&current) {
        tx.rollback().await.map_err(db_error)?;
        return Ok(SettleOutcome::Stale { current });
    }

    let token = HoldToken::from_uuid(locked.try_get("hold_token").map_err(db_error)?);
    let Some(hold) = fetch_hold(&mut tx, token, true).await? else {
        return Err(StoreError::Database(format!(
            "hold {token} of group {} is missing",
            settlement.code
        )));
    };

    let hold_state = match (settlement.disposition, hold.state) {
        (HoldDisposition::Commit, HoldState::Released)
        | (HoldDisposition::Release, HoldState::Committed) => {
            tx.rollback().await.map_err(db_error)?;
            return Ok(SettleOutcome::HoldUnavailable { state: hold.state });
        },
        (HoldDisposition::Commit, HoldState::Held) => {
            transition_hold(&mut tx, &hold, HoldState::Committed).await?;
            HoldState::Committed
        },
        (HoldDisposition::Release, HoldState::Held) => {
            transition_hold(&mut tx, &hold, HoldState::Released).await?;
            HoldState::Released
        },
        (_, already) => already,
    };

    let sql = format!(
        r"
        UPDATE registration_groups
        SET status = $2,
            updated_at = $3,
            confirmed_at = CASE WHEN $2 = 'confirmed' THEN $3 ELSE confirmed_at END,
            gateway_reference = COALESCE($4, gateway_reference)
        WHERE code = $1
        RETURNING {GROUP_COLUMNS}
        "
    );
    let row = sqlx::query(&sql)
        .bind(settlement.code.as_str())
        .bind(settlement.to.as_str())
        .bind(settlement.at)
        .bind(settlement.gateway_reference.as_deref())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;
    let group = group_from_row(&row)?;

    tx.commit().await.map_err(db_error)?;

    tracing::debug!(
        code = %settlement.code,
        from = %current,
        to = %settlement.to,
        hold_state = hold_state.as_str(),
        "Group settled"
    );

    Ok(SettleOutcome::Settled {
        group: Box::new(group),
        hold_state,
    })
}

pub(crate) async fn overdue_groups(
    pool: &PgPool,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<RegistrationGroup>, StoreError> {
    let sql = format!(
        r"
        SELECT {GROUP_COLUMNS}
        FROM registration_groups
        WHERE status = ANY($1) AND reserved_until < $2
          AND NOT EXISTS (
              SELECT 1 FROM inventory_holds h
              WHERE h.token = registration_groups.hold_token AND h.state = 'committed'
          )
        ORDER BY reserved_until ASC
        LIMIT $3
        "
    );
    let rows = sqlx::query(&sql)
        .bind(status_labels(&PaymentStatus::OPEN))
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(pool)
        .await
        .map_err(db_error)?;

    rows.iter().map(group_from_row).collect()
}

pub(crate) async fn set_notification_pending(
    pool: &PgPool,
    code: &GroupCode,
    pending: bool,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE registration_groups SET notification_pending = $2 WHERE code = $1")
        .bind(code.as_str())
        .bind(pending)
        .execute(pool)
        .await
        .map_err(db_error)?;
    Ok(())
}
