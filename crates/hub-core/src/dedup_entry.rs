//! In-memory dedup cache record (§3) — the data shape owned and mutated by
//! the dedup cache (C4, `services/hub::dedup`). TTL/LRU bookkeeping lives
//! with the cache; this type is the value stored per `req_id`.

use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupState {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct DedupEntry {
    pub req_id: String,
    pub first_seen: Instant,
    pub device_id: String,
    pub action: String,
    pub state: DedupState,
    pub result: serde_json::Value,
}

impl DedupEntry {
    pub fn begin(req_id: impl Into<String>, device_id: impl Into<String>, action: impl Into<String>, now: Instant) -> Self {
        Self {
            req_id: req_id.into(),
            first_seen: now,
            device_id: device_id.into(),
            action: action.into(),
            state: DedupState::Processing,
            result: serde_json::Value::Null,
        }
    }

    pub fn matches(&self, device_id: &str, action: &str) -> bool {
        self.device_id == device_id && self.action == action
    }

    pub fn is_expired(&self, now: Instant, ttl: std::time::Duration) -> bool {
        now.saturating_duration_since(self.first_seen) > ttl
    }
}
