//! Gateway attempt audit trail.

use crate::rows::{ATTEMPT_COLUMNS, attempt_from_row, db_error, violated_constraint};
use racepay_core::store::StoreError;
use racepay_core::types::{GatewayAttempt, GroupCode};
use sqlx::PgPool;

const REFERENCE_UNIQUE: &str = "gateway_attempts_reference_unique";

pub(crate) async fn record_attempt(pool: &PgPool, attempt: GatewayAttempt) -> Result<(), StoreError> {
    let result = sqlx::query(
        r"
        INSERT INTO gateway_attempts (
            reference, group_code, raw_response, normalized_error_code, outcome, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6)
        ",
    )
    .bind(&attempt.reference)
    .bind(attempt.group_code.as_str())
    .bind(&attempt.raw_response)
    .bind(attempt.normalized_error_code.map(|code| code.as_str()))
    .bind(attempt.outcome.as_str())
    .bind(attempt.created_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) if violated_constraint(&e) == Some(REFERENCE_UNIQUE) => {
            metrics::counter!("racepay_store_conflicts_total", "kind" => "reference").increment(1);
            Err(StoreError::DuplicateReference(attempt.reference))
        },
        Err(e) => Err(db_error(e)),
    }
}

pub(crate) async fn attempts_for(
    pool: &PgPool,
    code: &GroupCode,
) -> Result<Vec<GatewayAttempt>, StoreError> {
    let sql = format!(
        "SELECT {ATTEMPT_COLUMNS} FROM gateway_attempts WHERE group_code = $1 ORDER BY id ASC"
    );
    let rows = sqlx::query(&sql)
        .bind(code.as_str())
        .fetch_all(pool)
        .await
        .map_err(db_error)?;

    rows.iter().map(attempt_from_row).collect()
}

/// Gateway references and the manual references of groups that were not
/// rejected or expired share one namespace.
pub(crate) async fn reference_exists(pool: &PgPool, reference: &str) -> Result<bool, StoreError> {
    sqlx::query_scalar(
        r"
        SELECT EXISTS (SELECT 1 FROM gateway_attempts WHERE reference = $1)
            OR EXISTS (
                SELECT 1 FROM registration_groups
                WHERE manual_reference = $1 AND status NOT IN ('rejected', 'expired')
            )
        ",
    )
    .bind(reference)
    .fetch_one(pool)
    .await
    .map_err(db_error)
}
