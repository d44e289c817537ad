//! Schedule persistence (C3, §3 `Schedule`) — secondary to the command
//! engine; CRUD only, no cron-firing loop (the source treats scheduling as
//! an operator-managed table the engine's submit path does not consume
//! directly, matching `original_source/src/lab_orchestrator/scheduler.py`'s
//! separation between schedule storage and the firing loop).

use chrono::{DateTime, Utc};
use hub_core::{Schedule, ScheduleCommand, ScheduleType};
use sqlx::{PgPool, Row};

pub async fn upsert_schedule(pool: &PgPool, schedule: &Schedule, created_at: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO schedules
             (name, device_id, module, schedule_type, expression, commands, active, last_run, next_run, run_count, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
           ON CONFLICT (name) DO UPDATE SET
               device_id = EXCLUDED.device_id,
               module = EXCLUDED.module,
               schedule_type = EXCLUDED.schedule_type,
               expression = EXCLUDED.expression,
               commands = EXCLUDED.commands,
               active = EXCLUDED.active,
               last_run = EXCLUDED.last_run,
               next_run = EXCLUDED.next_run,
               run_count = EXCLUDED.run_count"#,
    )
    .bind(&schedule.name)
    .bind(&schedule.device_id)
    .bind(&schedule.module)
    .bind(schedule_type_str(schedule.schedule_type))
    .bind(&schedule.expression)
    .bind(serde_json::to_value(&schedule.commands).unwrap_or_default())
    .bind(schedule.active)
    .bind(schedule.last_run)
    .bind(schedule.next_run)
    .bind(schedule.run_count as i64)
    .bind(created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_active(pool: &PgPool) -> Result<Vec<Schedule>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT name, device_id, module, schedule_type, expression, commands, active, last_run, next_run, run_count
           FROM schedules WHERE active = true ORDER BY name"#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(from_row).collect())
}

fn from_row(row: sqlx::postgres::PgRow) -> Schedule {
    let commands: serde_json::Value = row.get("commands");
    let schedule_type: String = row.get("schedule_type");
    Schedule {
        name: row.get("name"),
        device_id: row.get("device_id"),
        module: row.get("module"),
        schedule_type: if schedule_type == "cron" { ScheduleType::Cron } else { ScheduleType::Once },
        expression: row.get("expression"),
        commands: serde_json::from_value::<Vec<ScheduleCommand>>(commands).unwrap_or_default(),
        active: row.get("active"),
        last_run: row.get("last_run"),
        next_run: row.get("next_run"),
        run_count: row.get::<i64, _>("run_count") as u64,
    }
}

fn schedule_type_str(t: ScheduleType) -> &'static str {
    match t {
        ScheduleType::Once => "once",
        ScheduleType::Cron => "cron",
    }
}
