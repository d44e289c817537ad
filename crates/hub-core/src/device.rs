//! Device registry data model (§3, §4.5).
//!
//! `Device` is created on first `meta` message, mutated by later
//! `meta`/`status`/`heartbeat` messages, and never destroyed — offline is
//! represented by the `online` flag, not by removal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub modules: Vec<String>,
    /// Per-module key -> value capability table.
    pub capabilities: serde_json::Value,
    pub labels: Vec<String>,
    pub version: String,
    pub last_seen: DateTime<Utc>,
    pub online: bool,
    pub metadata: serde_json::Value,
}

impl Device {
    pub fn from_meta(env: &hub_protocol::DeviceMetaEnvelope, now: DateTime<Utc>) -> Self {
        Self {
            device_id: env.device_id.clone(),
            modules: env.modules.clone(),
            capabilities: env.capabilities.clone(),
            labels: env.labels.clone(),
            version: env.version.clone(),
            last_seen: now,
            online: true,
            metadata: env.metadata.clone(),
        }
    }

    /// Merge a later `meta` message into this device (§4.5: "full or partial
    /// upsert"). Non-empty fields from `env` replace the corresponding field;
    /// an empty `modules`/`labels` list or the default version is treated as
    /// "unchanged" rather than as an explicit clear, matching a partial
    /// update's intent.
    pub fn merge_meta(&mut self, env: &hub_protocol::DeviceMetaEnvelope, now: DateTime<Utc>) {
        if !env.modules.is_empty() {
            self.modules = env.modules.clone();
        }
        if !env.capabilities.is_null() {
            self.capabilities = env.capabilities.clone();
        }
        if !env.labels.is_empty() {
            self.labels = env.labels.clone();
        }
        if env.version != "unknown" {
            self.version = env.version.clone();
        }
        if !env.metadata.is_null() {
            self.metadata = env.metadata.clone();
        }
        self.last_seen = now;
        self.online = true;
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.modules.iter().any(|m| m == module)
    }

    /// §4.5: heartbeat sweeper — a device whose `last_seen` is older than
    /// `staleness` goes offline.
    pub fn is_stale(&self, now: DateTime<Utc>, staleness: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_seen) > staleness
    }
}

/// Latest-per-(device,module) snapshot; history retained per retention policy
/// (§3 `ModuleStatus`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleStatus {
    pub device_id: String,
    pub module: String,
    pub state: String,
    pub fields: serde_json::Value,
    pub online: bool,
    pub timestamp: DateTime<Utc>,
}

/// Append-only heartbeat record (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub device_id: String,
    pub online: bool,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(device_id: &str) -> hub_protocol::DeviceMetaEnvelope {
        hub_protocol::DeviceMetaEnvelope {
            device_id: device_id.into(),
            modules: vec!["ndi".into()],
            capabilities: serde_json::json!({"ndi": {"viewer": true}}),
            labels: vec!["lab-a".into()],
            version: "1.0.0".into(),
            metadata: serde_json::json!({}),
            ts: "2026-07-28T12:00:00Z".into(),
        }
    }

    #[test]
    fn partial_meta_update_preserves_unset_fields() {
        let now = Utc::now();
        let mut device = Device::from_meta(&meta("rig-1"), now);
        device.online = false;

        let partial = hub_protocol::DeviceMetaEnvelope {
            device_id: "rig-1".into(),
            modules: vec![],
            capabilities: serde_json::Value::Null,
            labels: vec![],
            version: "unknown".into(),
            metadata: serde_json::Value::Null,
            ts: "2026-07-28T12:05:00Z".into(),
        };
        device.merge_meta(&partial, now + chrono::Duration::seconds(1));

        assert_eq!(device.modules, vec!["ndi".to_owned()]);
        assert_eq!(device.version, "1.0.0");
        assert!(device.online, "any meta message flips device back online");
    }

    #[test]
    fn staleness_threshold_flags_device_offline_after_grace() {
        let now = Utc::now();
        let device = Device::from_meta(&meta("rig-1"), now - chrono::Duration::seconds(400));
        assert!(device.is_stale(now, chrono::Duration::seconds(300)));
        assert!(!device.is_stale(now, chrono::Duration::seconds(500)));
    }
}
