//! Append-only audit event (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub device_id: Option<String>,
    pub module: Option<String>,
    pub actor: Option<String>,
    pub description: String,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, description: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type: event_type.into(),
            device_id: None,
            module: None,
            actor: None,
            description: description.into(),
            metadata: serde_json::Value::Null,
            timestamp,
        }
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Event type constants emitted by the engine (§4.6, §8 scenarios).
pub mod kinds {
    pub const COMMAND_EXECUTED: &str = "command_executed";
    pub const COMMAND_TIMEOUT: &str = "command_timeout";
    pub const COMMAND_FAILED: &str = "command_failed";
    pub const DEVICE_ONLINE: &str = "device_online";
    pub const DEVICE_OFFLINE: &str = "device_offline";
}
