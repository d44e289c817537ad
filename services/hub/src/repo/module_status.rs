//! Module-status persistence (C3, §4.3) — append-only history, with the
//! latest row per `(device_id, module)` queryable for routing decisions.

use chrono::{DateTime, Utc};
use hub_core::ModuleStatus;
use sqlx::{PgPool, Row};

pub async fn record_module_status(pool: &PgPool, status: &ModuleStatus) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO module_status (device_id, module, state, online, fields, recorded_at) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(&status.device_id)
    .bind(&status.module)
    .bind(&status.state)
    .bind(status.online)
    .bind(&status.fields)
    .bind(status.timestamp)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_latest_module_status(
    pool: &PgPool,
    device_id: &str,
    module: &str,
) -> Result<Option<ModuleStatus>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT device_id, module, state, online, fields, recorded_at
           FROM module_status WHERE device_id = $1 AND module = $2
           ORDER BY recorded_at DESC LIMIT 1"#,
    )
    .bind(device_id)
    .bind(module)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| ModuleStatus {
        device_id: r.get("device_id"),
        module: r.get("module"),
        state: r.get("state"),
        online: r.get("online"),
        fields: r.get("fields"),
        timestamp: r.get("recorded_at"),
    }))
}

pub async fn cleanup_old_module_status(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM module_status WHERE recorded_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
