//! Request-dedup cache (C4, §4.4) — a bounded, TTL-swept LRU of `req_id ->
//! DedupEntry`, process-local per §4.4 ("not shared across replicas").
//!
//! Grounded on `hub_core::dedup_entry::DedupEntry` for the value shape and on
//! the teacher's single-mutex-guarded-map style used throughout
//! `services/server::state::AppState` (e.g. `broadcast_registry`).

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use hub_core::{DedupEntry, DedupState};
use lru::LruCache;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum CheckResult {
    Fresh,
    Processing,
    Completed(serde_json::Value),
    /// A matching `req_id` is on file for a *different* (device, action).
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginResult {
    Accepted,
    AlreadyProcessing,
}

pub struct DedupCache {
    entries: Mutex<LruCache<String, DedupEntry>>,
    ttl: Duration,
}

impl DedupCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to at least 1");
        Self { entries: Mutex::new(LruCache::new(capacity)), ttl }
    }

    /// §4.4 `check`. Sweeps expired entries first, so an expired req_id reads
    /// back as `Fresh` rather than `Completed`/`Processing`.
    pub async fn check(&self, req_id: &str, device_id: &str, action: &str) -> CheckResult {
        let now = Instant::now();
        let mut guard = self.entries.lock().await;
        self.sweep_expired(&mut guard, now);
        match guard.peek(req_id) {
            None => CheckResult::Fresh,
            Some(entry) if !entry.matches(device_id, action) => CheckResult::Conflict,
            Some(entry) => match entry.state {
                DedupState::Processing => CheckResult::Processing,
                DedupState::Completed | DedupState::Failed => CheckResult::Completed(entry.result.clone()),
            },
        }
    }

    /// §4.4 `begin` — atomic test-and-set of the `processing` flag.
    pub async fn begin(&self, req_id: &str, device_id: &str, action: &str) -> BeginResult {
        let now = Instant::now();
        let mut guard = self.entries.lock().await;
        self.sweep_expired(&mut guard, now);
        if guard.peek(req_id).is_some() {
            return BeginResult::AlreadyProcessing;
        }
        guard.put(req_id.to_owned(), DedupEntry::begin(req_id, device_id, action, now));
        BeginResult::Accepted
    }

    pub async fn finish_ok(&self, req_id: &str, result: serde_json::Value) {
        self.finish(req_id, DedupState::Completed, result).await;
    }

    pub async fn finish_err(&self, req_id: &str, error: serde_json::Value) {
        self.finish(req_id, DedupState::Failed, error).await;
    }

    /// §7 `PersistenceFailure`/`BusFailure` rollback: clear the in-flight
    /// marker entirely so a resubmit with the same `req_id` is treated as
    /// fresh rather than permanently stuck `processing`.
    pub async fn rollback(&self, req_id: &str) {
        self.entries.lock().await.pop(req_id);
    }

    async fn finish(&self, req_id: &str, state: DedupState, result: serde_json::Value) {
        let mut guard = self.entries.lock().await;
        if let Some(entry) = guard.get_mut(req_id) {
            entry.state = state;
            entry.result = result;
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    fn sweep_expired(&self, guard: &mut LruCache<String, DedupEntry>, now: Instant) {
        let expired: Vec<String> = guard
            .iter()
            .filter(|(_, entry)| entry.is_expired(now, self.ttl))
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            guard.pop(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_req_id_reports_fresh_then_processing_after_begin() {
        let cache = DedupCache::new(10, Duration::from_secs(300));
        assert_eq!(cache.check("r1", "d1", "start").await, CheckResult::Fresh);
        assert_eq!(cache.begin("r1", "d1", "start").await, BeginResult::Accepted);
        assert_eq!(cache.check("r1", "d1", "start").await, CheckResult::Processing);
    }

    #[tokio::test]
    async fn second_begin_for_same_req_id_is_already_processing() {
        let cache = DedupCache::new(10, Duration::from_secs(300));
        assert_eq!(cache.begin("r1", "d1", "start").await, BeginResult::Accepted);
        assert_eq!(cache.begin("r1", "d1", "start").await, BeginResult::AlreadyProcessing);
    }

    #[tokio::test]
    async fn completed_entry_returns_cached_result() {
        let cache = DedupCache::new(10, Duration::from_secs(300));
        cache.begin("r1", "d1", "start").await;
        cache.finish_ok("r1", serde_json::json!({"success": true})).await;
        assert_eq!(
            cache.check("r1", "d1", "start").await,
            CheckResult::Completed(serde_json::json!({"success": true}))
        );
    }

    #[tokio::test]
    async fn mismatched_device_or_action_is_a_conflict() {
        let cache = DedupCache::new(10, Duration::from_secs(300));
        cache.begin("r1", "d1", "start").await;
        assert_eq!(cache.check("r1", "d2", "start").await, CheckResult::Conflict);
        assert_eq!(cache.check("r1", "d1", "stop").await, CheckResult::Conflict);
    }

    #[tokio::test]
    async fn expired_entry_reads_back_as_fresh() {
        let cache = DedupCache::new(10, Duration::from_millis(10));
        cache.begin("r1", "d1", "start").await;
        cache.finish_ok("r1", serde_json::json!({})).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.check("r1", "d1", "start").await, CheckResult::Fresh);
    }

    #[tokio::test]
    async fn rollback_clears_in_flight_marker() {
        let cache = DedupCache::new(10, Duration::from_secs(300));
        cache.begin("r1", "d1", "start").await;
        cache.rollback("r1").await;
        assert_eq!(cache.check("r1", "d1", "start").await, CheckResult::Fresh);
    }

    #[tokio::test]
    async fn cache_never_exceeds_configured_capacity() {
        let cache = DedupCache::new(4, Duration::from_secs(300));
        for i in 0..10 {
            cache.begin(&format!("r{i}"), "d1", "start").await;
            assert!(cache.len().await <= 4);
        }
    }
}
