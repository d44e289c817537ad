//! Persistence gateway (C3, §4.3) — the only module that touches `sqlx`
//! directly. Every write that represents an idempotent upsert uses
//! `ON CONFLICT`, following `services/server::repo::races`'s pattern, and
//! every call is wrapped in [`hub_core::retry::retry_async`] under
//! [`hub_core::retry::RetryPolicy::database_default`] so a transient
//! connection blip doesn't fail a caller outright.

pub mod commands;
pub mod dead_letters;
pub mod devices;
pub mod events;
pub mod module_status;
pub mod schedules;

use chrono::{DateTime, Utc};
use hub_core::retry::{retry_async, RetryPolicy};
use hub_core::{Command, DeadLetterRecord, Device, Event, FailureReason, ModuleStatus, Schedule};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("retries exhausted: {0}")]
    RetriesExhausted(#[from] hub_core::retry::RetryError),
}

#[derive(Clone)]
pub struct PersistenceGateway {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PersistenceGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, retry: RetryPolicy::database_default() }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Retries a fallible DB call under the database retry policy. All
    /// `sqlx::Error` are treated as retriable here — the gateway does not
    /// attempt to distinguish connection errors from constraint violations,
    /// deferring that judgment to callers that care (none currently do).
    /// `name` labels the op/latency metrics C9 requires (§4.9).
    pub(crate) async fn with_retry<T, Fut, F>(&self, name: &'static str, op: F) -> Result<T, PersistenceError>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        let start = std::time::Instant::now();
        let result = retry_async(&self.retry, op, |_e| true).await.map_err(PersistenceError::from);
        crate::metrics::record_persistence_op(name, start.elapsed().as_secs_f64() * 1000.0, result.is_ok());
        result
    }

    pub async fn upsert_device(&self, device: &Device) -> Result<(), PersistenceError> {
        self.with_retry("upsert_device", |_attempt| devices::upsert_device(&self.pool, device)).await
    }

    pub async fn get_device(&self, device_id: &str) -> Result<Option<Device>, PersistenceError> {
        self.with_retry("get_device", |_attempt| devices::get_device(&self.pool, device_id)).await
    }

    pub async fn list_devices(&self, online_only: bool) -> Result<Vec<Device>, PersistenceError> {
        self.with_retry("list_devices", |_attempt| devices::list_devices(&self.pool, online_only)).await
    }

    pub async fn record_heartbeat(
        &self,
        device_id: &str,
        online: bool,
        metadata: &serde_json::Value,
        received_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        self.with_retry("record_heartbeat", |_attempt| {
            devices::record_heartbeat(&self.pool, device_id, online, metadata, received_at)
        })
        .await
    }

    pub async fn record_module_status(&self, status: &ModuleStatus) -> Result<(), PersistenceError> {
        self.with_retry("record_module_status", |_attempt| module_status::record_module_status(&self.pool, status)).await
    }

    pub async fn get_latest_module_status(
        &self,
        device_id: &str,
        module: &str,
    ) -> Result<Option<ModuleStatus>, PersistenceError> {
        self.with_retry("get_latest_module_status", |_attempt| {
            module_status::get_latest_module_status(&self.pool, device_id, module)
        })
        .await
    }

    pub async fn record_command_dispatch(&self, command: &Command) -> Result<(), PersistenceError> {
        self.with_retry("record_command_dispatch", |_attempt| commands::record_command_dispatch(&self.pool, command)).await
    }

    /// Idempotent by `req_id` (§8 invariant 3) — see `commands::record_command_ack`.
    pub async fn record_command_ack(&self, command: &Command) -> Result<Command, PersistenceError> {
        self.with_retry("record_command_ack", |_attempt| commands::record_command_ack(&self.pool, command)).await
    }

    pub async fn get_command_by_req_id(&self, req_id: &str) -> Result<Option<Command>, PersistenceError> {
        self.with_retry("get_command_by_req_id", |_attempt| commands::get_by_req_id(&self.pool, req_id)).await
    }

    pub async fn record_event(&self, event: &Event) -> Result<(), PersistenceError> {
        self.with_retry("record_event", |_attempt| events::record_event(&self.pool, event)).await
    }

    pub async fn insert_dead_letter(&self, record: &DeadLetterRecord) -> Result<(), PersistenceError> {
        self.with_retry("insert_dead_letter", |_attempt| dead_letters::insert(&self.pool, record)).await
    }

    pub async fn get_dead_letter(&self, id: Uuid) -> Result<Option<DeadLetterRecord>, PersistenceError> {
        self.with_retry("get_dead_letter", |_attempt| dead_letters::get(&self.pool, id)).await
    }

    pub async fn list_dead_letters(
        &self,
        device_id: Option<&str>,
        reason: Option<FailureReason>,
        limit: i64,
    ) -> Result<Vec<DeadLetterRecord>, PersistenceError> {
        self.with_retry("list_dead_letters", |_attempt| dead_letters::list(&self.pool, device_id, reason, limit)).await
    }

    pub async fn record_dead_letter_retry(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<DeadLetterRecord>, PersistenceError> {
        self.with_retry("record_dead_letter_retry", |_attempt| dead_letters::record_retry(&self.pool, id, at)).await
    }

    pub async fn dead_letter_stats(&self) -> Result<dead_letters::DlqStats, PersistenceError> {
        self.with_retry("dead_letter_stats", |_attempt| dead_letters::stats(&self.pool)).await
    }

    pub async fn upsert_schedule(&self, schedule: &Schedule, created_at: DateTime<Utc>) -> Result<(), PersistenceError> {
        self.with_retry("upsert_schedule", |_attempt| schedules::upsert_schedule(&self.pool, schedule, created_at)).await
    }

    pub async fn list_active_schedules(&self) -> Result<Vec<Schedule>, PersistenceError> {
        self.with_retry("list_active_schedules", |_attempt| schedules::list_active(&self.pool)).await
    }

    /// §9 Open Question: cutoff = start-of-today UTC minus `days`. Prunes
    /// heartbeats, module-status history and events; never commands or
    /// dead-letters (those are purged separately, by the operator, via
    /// `dead_letters::purge_older_than`).
    pub async fn cleanup_old(&self, days: i64, now: DateTime<Utc>) -> Result<CleanupReport, PersistenceError> {
        let cutoff = now.date_naive().and_hms_opt(0, 0, 0).expect("midnight is a valid time").and_utc()
            - chrono::Duration::days(days);
        let heartbeats = self.with_retry("cleanup_old_heartbeats", |_attempt| devices::cleanup_old_heartbeats(&self.pool, cutoff)).await?;
        let module_status = self
            .with_retry("cleanup_old_module_status", |_attempt| module_status::cleanup_old_module_status(&self.pool, cutoff))
            .await?;
        let events = self.with_retry("cleanup_old_events", |_attempt| events::cleanup_old_events(&self.pool, cutoff)).await?;
        Ok(CleanupReport { heartbeats, module_status, events })
    }

    pub async fn purge_dead_letters_older_than(&self, days: i64, now: DateTime<Utc>) -> Result<u64, PersistenceError> {
        let cutoff = now.date_naive().and_hms_opt(0, 0, 0).expect("midnight is a valid time").and_utc()
            - chrono::Duration::days(days);
        self.with_retry("purge_dead_letters_older_than", |_attempt| dead_letters::purge_older_than(&self.pool, cutoff)).await
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupReport {
    pub heartbeats: u64,
    pub module_status: u64,
    pub events: u64,
}
