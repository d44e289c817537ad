//! Dead-letter persistence (C7/C3, §4.7). The source left this as a stub
//! (SPEC_FULL §9 Open Question); this is the concrete table.

use chrono::{DateTime, Utc};
use hub_core::{DeadLetterRecord, FailureReason};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub async fn insert(pool: &PgPool, record: &DeadLetterRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO dead_letters
             (id, device_id, module, req_id, original_topic, original_payload,
              failure_reason, error_message, retry_count, metadata, first_failed_at, last_failed_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
    )
    .bind(record.id)
    .bind(&record.device_id)
    .bind(&record.module)
    .bind(&record.req_id)
    .bind(&record.original_topic)
    .bind(&record.original_payload)
    .bind(record.failure_reason.as_str())
    .bind(&record.error_message)
    .bind(i64::from(record.retry_count))
    .bind(&record.metadata)
    .bind(record.first_failed_at)
    .bind(record.last_failed_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<DeadLetterRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, device_id, module, req_id, original_topic, original_payload,
                  failure_reason, error_message, retry_count, metadata, first_failed_at, last_failed_at
           FROM dead_letters WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(from_row))
}

pub async fn list(
    pool: &PgPool,
    device_id: Option<&str>,
    reason: Option<FailureReason>,
    limit: i64,
) -> Result<Vec<DeadLetterRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id, device_id, module, req_id, original_topic, original_payload,
                  failure_reason, error_message, retry_count, metadata, first_failed_at, last_failed_at
           FROM dead_letters
           WHERE ($1::text IS NULL OR device_id = $1)
             AND ($2::text IS NULL OR failure_reason = $2)
           ORDER BY first_failed_at DESC LIMIT $3"#,
    )
    .bind(device_id)
    .bind(reason.map(FailureReason::as_str))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(from_row).collect())
}

/// Increments `retry_count` and bumps `last_failed_at`. Returns the updated
/// record, or `None` if it no longer exists.
pub async fn record_retry(pool: &PgPool, id: Uuid, at: DateTime<Utc>) -> Result<Option<DeadLetterRecord>, sqlx::Error> {
    sqlx::query("UPDATE dead_letters SET retry_count = retry_count + 1, last_failed_at = $2 WHERE id = $1")
        .bind(id)
        .bind(at)
        .execute(pool)
        .await?;
    get(pool, id).await
}

pub async fn purge_older_than(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM dead_letters WHERE first_failed_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub struct DlqStats {
    pub total: i64,
    pub by_reason: Vec<(String, i64)>,
}

pub async fn stats(pool: &PgPool) -> Result<DlqStats, sqlx::Error> {
    let total_row = sqlx::query("SELECT COUNT(*) AS n FROM dead_letters").fetch_one(pool).await?;
    let rows = sqlx::query("SELECT failure_reason, COUNT(*) AS n FROM dead_letters GROUP BY failure_reason")
        .fetch_all(pool)
        .await?;
    Ok(DlqStats {
        total: total_row.get("n"),
        by_reason: rows.into_iter().map(|r| (r.get("failure_reason"), r.get("n"))).collect(),
    })
}

fn from_row(row: sqlx::postgres::PgRow) -> DeadLetterRecord {
    let reason: String = row.get("failure_reason");
    DeadLetterRecord {
        id: row.get("id"),
        original_topic: row.get("original_topic"),
        original_payload: row.get("original_payload"),
        failure_reason: parse_reason(&reason),
        error_message: row.get("error_message"),
        device_id: row.get("device_id"),
        module: row.get("module"),
        req_id: row.get("req_id"),
        retry_count: row.get::<i64, _>("retry_count") as u32,
        first_failed_at: row.get("first_failed_at"),
        last_failed_at: row.get("last_failed_at"),
        metadata: row.get("metadata"),
    }
}

fn parse_reason(s: &str) -> FailureReason {
    use FailureReason::*;
    match s {
        "device_unreachable" => DeviceUnreachable,
        "module_error" => ModuleError,
        "timeout" => Timeout,
        "processing_error" => ProcessingError,
        "retry_exhausted" => RetryExhausted,
        "schema_violation" => SchemaViolation,
        "resource_locked" => ResourceLocked,
        "unknown_device" => UnknownDevice,
        "unknown_module" => UnknownModule,
        _ => ValidationError,
    }
}
