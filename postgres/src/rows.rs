//! Row decoding and column conversions.

use chrono::{DateTime, Utc};
use racepay_core::store::StoreError;
use racepay_core::types::{
    GatewayAttempt, GroupCode, Hold, HoldLine, HoldToken, InventoryItem, InventoryKey, Money,
    PaymentMethod, Registrant, RegistrationGroup, Runner,
};
use sqlx::Row;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

/// Columns selected for an inventory row.
pub(crate) const ITEM_COLUMNS: &str = "size, gender, stock, reserved, assigned";

/// Columns selected for a hold.
pub(crate) const HOLD_COLUMNS: &str = "token, lines, state, created_at";

/// Columns selected for a registration group.
pub(crate) const GROUP_COLUMNS: &str = "code, idempotency_key, registrant, runners, \
    payment_method, status, hold_token, amount_cents, reserved_until, gateway_reference, \
    confirmed_at, notification_pending, created_at, updated_at";

/// Columns selected for a gateway attempt.
pub(crate) const ATTEMPT_COLUMNS: &str =
    "reference, group_code, raw_response, normalized_error_code, outcome, created_at";

pub(crate) fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Name of the constraint a database error violated, if any.
pub(crate) fn violated_constraint(e: &sqlx::Error) -> Option<&str> {
    match e {
        sqlx::Error::Database(db) => db.constraint(),
        _ => None,
    }
}

pub(crate) fn to_db_count(n: u32) -> Result<i32, StoreError> {
    i32::try_from(n).map_err(|_| StoreError::Serialization(format!("count {n} exceeds INTEGER")))
}

pub(crate) fn from_db_count(n: i32) -> Result<u32, StoreError> {
    u32::try_from(n).map_err(|_| StoreError::Serialization(format!("negative count {n}")))
}

pub(crate) fn to_db_cents(money: Money) -> Result<i64, StoreError> {
    i64::try_from(money.cents())
        .map_err(|_| StoreError::Serialization(format!("amount {money} exceeds BIGINT")))
}

fn parse<T>(value: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e: T::Err| StoreError::Serialization(e.to_string()))
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(|e| match e {
        sqlx::Error::ColumnDecode { .. } => StoreError::Serialization(e.to_string()),
        other => db_error(other),
    })
}

pub(crate) fn item_from_row(row: &PgRow) -> Result<InventoryItem, StoreError> {
    let size: String = get(row, "size")?;
    let gender: String = get(row, "gender")?;
    Ok(InventoryItem {
        key: InventoryKey::new(parse(&size)?, parse(&gender)?),
        stock: from_db_count(get(row, "stock")?)?,
        reserved: from_db_count(get(row, "reserved")?)?,
        assigned: from_db_count(get(row, "assigned")?)?,
    })
}

pub(crate) fn hold_from_row(row: &PgRow) -> Result<Hold, StoreError> {
    let token: Uuid = get(row, "token")?;
    let Json(lines): Json<Vec<HoldLine>> = get(row, "lines")?;
    let state: String = get(row, "state")?;
    Ok(Hold {
        token: HoldToken::from_uuid(token),
        lines,
        state: parse(&state)?,
        created_at: get(row, "created_at")?,
    })
}

pub(crate) fn group_from_row(row: &PgRow) -> Result<RegistrationGroup, StoreError> {
    let code: String = get(row, "code")?;
    let Json(registrant): Json<Registrant> = get(row, "registrant")?;
    let Json(runners): Json<Vec<Runner>> = get(row, "runners")?;
    let Json(payment_method): Json<PaymentMethod> = get(row, "payment_method")?;
    let status: String = get(row, "status")?;
    let hold_token: Uuid = get(row, "hold_token")?;
    let amount_cents: i64 = get(row, "amount_cents")?;
    let reserved_until: DateTime<Utc> = get(row, "reserved_until")?;

    Ok(RegistrationGroup {
        code: GroupCode::new(code),
        idempotency_key: get(row, "idempotency_key")?,
        registrant,
        runners,
        payment_method,
        status: parse(&status)?,
        hold_token: HoldToken::from_uuid(hold_token),
        amount: Money::from_cents(u64::try_from(amount_cents).map_err(|_| {
            StoreError::Serialization(format!("negative amount {amount_cents}"))
        })?),
        reserved_until,
        gateway_reference: get(row, "gateway_reference")?,
        confirmed_at: get(row, "confirmed_at")?,
        notification_pending: get(row, "notification_pending")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

pub(crate) fn attempt_from_row(row: &PgRow) -> Result<GatewayAttempt, StoreError> {
    let group_code: String = get(row, "group_code")?;
    let code: Option<String> = get(row, "normalized_error_code")?;
    let outcome: String = get(row, "outcome")?;
    Ok(GatewayAttempt {
        reference: get(row, "reference")?,
        group_code: GroupCode::new(group_code),
        raw_response: get(row, "raw_response")?,
        normalized_error_code: code.as_deref().map(parse).transpose()?,
        outcome: parse(&outcome)?,
        created_at: get(row, "created_at")?,
    })
}
