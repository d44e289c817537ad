//! Persistence-gateway integration tests (C3, §4.3) against a real,
//! throwaway Postgres instance — grounded on `services/server`'s own
//! `testcontainers`-backed repo tests. Exercises the §8 invariants that only
//! bite once a real unique index and `FOR UPDATE` row lock are involved:
//! "at most one row per req_id" and "record_command_ack is idempotent".

use chrono::Utc;
use hub::repo::PersistenceGateway;
use hub_core::{Command, CommandStatus, DeadLetterRecord, Event, FailureReason};
use hub_test_utils::postgres::start_postgres;

async fn migrated_gateway() -> (testcontainers::ContainerAsync<testcontainers_modules::postgres::Postgres>, PersistenceGateway) {
    let (container, pool) = start_postgres().await;
    sqlx::migrate!("./migrations").run(&pool).await.expect("apply migrations");
    (container, PersistenceGateway::new(pool))
}

fn dispatched(req_id: &str, device_id: &str) -> Command {
    Command::new_dispatched(req_id, device_id, Some("ndi".to_owned()), "api", "start", serde_json::json!({"x": 1}), Utc::now())
}

/// §8 invariant 1: at most one `commands` row per `req_id`, even when
/// `record_command_dispatch` races against itself (e.g. a retried publish).
#[tokio::test]
async fn req_id_is_unique_across_duplicate_dispatch_attempts() {
    let (_guard, repo) = migrated_gateway().await;
    let first = dispatched("r1", "rig-1");
    let mut second = dispatched("r1", "rig-1");
    second.id = uuid::Uuid::new_v4();

    repo.record_command_dispatch(&first).await.unwrap();
    repo.record_command_dispatch(&second).await.unwrap();

    let stored = repo.get_command_by_req_id("r1").await.unwrap().expect("row exists");
    assert_eq!(stored.id, first.id, "the second dispatch with the same req_id must not create a second row");
}

/// §8 invariant 3: `record_command_ack` called twice returns the row stored
/// by the first call, unchanged, rather than overwriting a terminal status.
#[tokio::test]
async fn record_command_ack_is_idempotent_by_req_id() {
    let (_guard, repo) = migrated_gateway().await;
    let mut command = dispatched("r2", "rig-1");
    repo.record_command_dispatch(&command).await.unwrap();

    command.finalize_acked(Utc::now(), true, None, serde_json::json!({"code": "OK"}));
    let first = repo.record_command_ack(&command).await.unwrap();

    // A late/duplicate ack for the same req_id, reporting failure this time,
    // must not flip the already-terminal row.
    let mut late = dispatched("r2", "rig-1");
    late.finalize_acked(Utc::now(), false, Some("late and wrong".into()), serde_json::json!({}));
    let second = repo.record_command_ack(&late).await.unwrap();

    assert_eq!(second.status, CommandStatus::Acked);
    assert_eq!(second.success, Some(true));
    assert_eq!(second.duration_ms, first.duration_ms);
}

/// §8 invariant 2: a terminal command's `success` is consistent with its
/// status, as observed through a real round trip.
#[tokio::test]
async fn terminal_statuses_round_trip_with_consistent_success() {
    let (_guard, repo) = migrated_gateway().await;
    let mut timed_out = dispatched("r3", "rig-1");
    timed_out.finalize_timeout();
    repo.record_command_dispatch(&timed_out).await.unwrap();
    repo.record_command_ack(&timed_out).await.unwrap();

    let stored = repo.get_command_by_req_id("r3").await.unwrap().unwrap();
    assert!(stored.check_invariants());
    assert_eq!(stored.status, CommandStatus::Timeout);
    assert_eq!(stored.success, Some(false));
}

/// Cleanup retains commands indefinitely (§9 Open Question) while pruning
/// old events to the configured cutoff.
#[tokio::test]
async fn cleanup_old_prunes_events_but_never_commands() {
    let (_guard, repo) = migrated_gateway().await;
    let command = dispatched("r4", "rig-1");
    repo.record_command_dispatch(&command).await.unwrap();

    let old = Utc::now() - chrono::Duration::days(90);
    let event = Event::new("device_online", "stale event", old).with_device("rig-1");
    repo.record_event(&event).await.unwrap();

    let report = repo.cleanup_old(30, Utc::now()).await.unwrap();
    assert_eq!(report.events, 1);
    assert!(repo.get_command_by_req_id("r4").await.unwrap().is_some(), "cleanup must never delete commands");
}

/// §4.7 retry-exhaustion boundary, exercised against the real table: once
/// `retry_count` reaches the configured max, the gateway still reports the
/// incremented count faithfully — refusal itself is the DLQ's job, not the
/// gateway's, but the count it returns must be trustworthy.
#[tokio::test]
async fn dead_letter_retry_count_increments_and_persists() {
    let (_guard, repo) = migrated_gateway().await;
    let record = DeadLetterRecord::new(
        "/lab/device/rig-1/ndi/cmd",
        serde_json::json!({}),
        FailureReason::Timeout,
        "no ack",
        Utc::now(),
    )
    .with_scope(Some("rig-1".to_owned()), Some("ndi".to_owned()), Some("r5".to_owned()));
    repo.insert_dead_letter(&record).await.unwrap();

    let updated = repo.record_dead_letter_retry(record.id, Utc::now()).await.unwrap().expect("record exists");
    assert_eq!(updated.retry_count, 1);

    let stats = repo.dead_letter_stats().await.unwrap();
    assert_eq!(stats.total, 1);
}
