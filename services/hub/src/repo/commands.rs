//! Command persistence (C3, §4.3) — the engine's primary record.
//!
//! `record_command_ack` is idempotent by `req_id` (§8 invariant 3): a second
//! call with the same `req_id` returns the row already stored, leaving it
//! untouched, rather than overwriting a terminal status with a later one
//! (e.g. a late ack arriving after a timeout already finalized the row).

use hub_core::{Command, CommandStatus};
use sqlx::{PgPool, Row};

pub async fn record_command_dispatch(pool: &PgPool, command: &Command) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO commands
             (id, req_id, device_id, module, actor, action, params, status, dispatched_at,
              acked_at, success, error_message, response_details, duration_ms)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
           ON CONFLICT (req_id) DO NOTHING"#,
    )
    .bind(command.id)
    .bind(&command.req_id)
    .bind(&command.device_id)
    .bind(&command.module)
    .bind(&command.actor)
    .bind(&command.action)
    .bind(&command.params)
    .bind(status_str(command.status))
    .bind(command.dispatched_at)
    .bind(command.acked_at)
    .bind(command.success)
    .bind(&command.error_message)
    .bind(&command.response_details)
    .bind(command.duration_ms)
    .execute(pool)
    .await?;
    Ok(())
}

/// Finalize a command row (ack, local failure, or timeout). Idempotent: if
/// the row is already in a terminal status, the existing row is returned
/// unchanged and no write happens.
pub async fn record_command_ack(pool: &PgPool, command: &Command) -> Result<Command, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let existing = sqlx::query(
        "SELECT status FROM commands WHERE req_id = $1 FOR UPDATE",
    )
    .bind(&command.req_id)
    .fetch_optional(&mut *tx)
    .await?;

    let already_terminal = existing
        .as_ref()
        .map(|r| r.get::<String, _>("status") != status_str(CommandStatus::Dispatched))
        .unwrap_or(false);

    if already_terminal {
        tx.commit().await?;
        return get_by_req_id(pool, &command.req_id)
            .await
            .map(|c| c.expect("row existed under FOR UPDATE"));
    }

    sqlx::query(
        r#"UPDATE commands SET status = $2, acked_at = $3, success = $4,
               error_message = $5, response_details = $6, duration_ms = $7
           WHERE req_id = $1"#,
    )
    .bind(&command.req_id)
    .bind(status_str(command.status))
    .bind(command.acked_at)
    .bind(command.success)
    .bind(&command.error_message)
    .bind(&command.response_details)
    .bind(command.duration_ms)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    get_by_req_id(pool, &command.req_id)
        .await
        .map(|c| c.expect("row just written"))
}

pub async fn get_by_req_id(pool: &PgPool, req_id: &str) -> Result<Option<Command>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, req_id, device_id, module, actor, action, params, status, dispatched_at,
                  acked_at, success, error_message, response_details, duration_ms
           FROM commands WHERE req_id = $1"#,
    )
    .bind(req_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(command_from_row))
}

fn command_from_row(row: sqlx::postgres::PgRow) -> Command {
    Command {
        id: row.get("id"),
        req_id: row.get("req_id"),
        device_id: row.get("device_id"),
        module: row.get("module"),
        actor: row.get("actor"),
        action: row.get("action"),
        params: row.get("params"),
        status: status_from_str(&row.get::<String, _>("status")),
        dispatched_at: row.get("dispatched_at"),
        acked_at: row.get("acked_at"),
        success: row.get("success"),
        error_message: row.get("error_message"),
        response_details: row.get("response_details"),
        duration_ms: row.get("duration_ms"),
    }
}

fn status_str(status: CommandStatus) -> &'static str {
    match status {
        CommandStatus::Dispatched => "dispatched",
        CommandStatus::Acked => "acked",
        CommandStatus::Failed => "failed",
        CommandStatus::Timeout => "timeout",
    }
}

fn status_from_str(s: &str) -> CommandStatus {
    match s {
        "acked" => CommandStatus::Acked,
        "failed" => CommandStatus::Failed,
        "timeout" => CommandStatus::Timeout,
        _ => CommandStatus::Dispatched,
    }
}
