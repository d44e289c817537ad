//! Device and heartbeat persistence (C3, §4.3), grounded on
//! `services/server::repo::races`'s `ON CONFLICT` upsert style.

use chrono::{DateTime, Utc};
use hub_core::Device;
use sqlx::{PgPool, Row};

pub async fn upsert_device(pool: &PgPool, device: &Device) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO devices (device_id, modules, capabilities, labels, version, last_seen, online, metadata)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
           ON CONFLICT (device_id) DO UPDATE SET
               modules = EXCLUDED.modules,
               capabilities = EXCLUDED.capabilities,
               labels = EXCLUDED.labels,
               version = EXCLUDED.version,
               last_seen = EXCLUDED.last_seen,
               online = EXCLUDED.online,
               metadata = EXCLUDED.metadata"#,
    )
    .bind(&device.device_id)
    .bind(serde_json::to_value(&device.modules).unwrap_or_default())
    .bind(&device.capabilities)
    .bind(serde_json::to_value(&device.labels).unwrap_or_default())
    .bind(&device.version)
    .bind(device.last_seen)
    .bind(device.online)
    .bind(&device.metadata)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_device(pool: &PgPool, device_id: &str) -> Result<Option<Device>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT device_id, modules, capabilities, labels, version, last_seen, online, metadata FROM devices WHERE device_id = $1",
    )
    .bind(device_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(device_from_row))
}

pub async fn list_devices(pool: &PgPool, online_only: bool) -> Result<Vec<Device>, sqlx::Error> {
    let rows = if online_only {
        sqlx::query(
            "SELECT device_id, modules, capabilities, labels, version, last_seen, online, metadata FROM devices WHERE online = true ORDER BY device_id",
        )
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query(
            "SELECT device_id, modules, capabilities, labels, version, last_seen, online, metadata FROM devices ORDER BY device_id",
        )
        .fetch_all(pool)
        .await?
    };
    Ok(rows.into_iter().map(device_from_row).collect())
}

fn device_from_row(row: sqlx::postgres::PgRow) -> Device {
    let modules: serde_json::Value = row.get("modules");
    let labels: serde_json::Value = row.get("labels");
    Device {
        device_id: row.get("device_id"),
        modules: serde_json::from_value(modules).unwrap_or_default(),
        capabilities: row.get("capabilities"),
        labels: serde_json::from_value(labels).unwrap_or_default(),
        version: row.get("version"),
        last_seen: row.get("last_seen"),
        online: row.get("online"),
        metadata: row.get("metadata"),
    }
}

pub async fn record_heartbeat(
    pool: &PgPool,
    device_id: &str,
    online: bool,
    metadata: &serde_json::Value,
    received_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO heartbeats (device_id, online, metadata, received_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(device_id)
    .bind(online)
    .bind(metadata)
    .bind(received_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Retention per §9 Open Question: cutoff = start-of-today UTC minus `days`;
/// heartbeats are pruned, never commands.
pub async fn cleanup_old_heartbeats(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM heartbeats WHERE received_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
