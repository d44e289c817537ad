//! Audit event persistence (C3, §4.3) — append-only, pruned per the
//! retention policy (never commands).

use chrono::{DateTime, Utc};
use hub_core::Event;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub async fn record_event(pool: &PgPool, event: &Event) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO events (id, event_type, device_id, module, actor, description, metadata, occurred_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
    )
    .bind(Uuid::new_v4())
    .bind(&event.event_type)
    .bind(&event.device_id)
    .bind(&event.module)
    .bind(&event.actor)
    .bind(&event.description)
    .bind(&event.metadata)
    .bind(event.timestamp)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn recent_events(pool: &PgPool, limit: i64) -> Result<Vec<Event>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT event_type, device_id, module, actor, description, metadata, occurred_at FROM events ORDER BY occurred_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| Event {
            event_type: r.get("event_type"),
            device_id: r.get("device_id"),
            module: r.get("module"),
            actor: r.get("actor"),
            description: r.get("description"),
            metadata: r.get("metadata"),
            timestamp: r.get("occurred_at"),
        })
        .collect())
}

pub async fn cleanup_old_events(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM events WHERE occurred_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
