//! Builders for the envelope/domain types, with sane defaults so tests only
//! spell out the field under test.

use chrono::Utc;
use hub_protocol::{AckEnvelope, CommandEnvelope, DeviceMetaEnvelope};

pub fn now_ts() -> String {
    Utc::now().to_rfc3339()
}

pub fn command_envelope(req_id: &str, action: &str) -> CommandEnvelope {
    CommandEnvelope {
        req_id: req_id.to_owned(),
        actor: "api".to_owned(),
        ts: now_ts(),
        action: action.to_owned(),
        params: serde_json::json!({}),
    }
}

pub fn ack_envelope(req_id: &str, action: &str, success: bool) -> AckEnvelope {
    AckEnvelope {
        req_id: req_id.to_owned(),
        success,
        action: action.to_owned(),
        actor: "host:rig-1".to_owned(),
        code: if success { "OK".to_owned() } else { "DEVICE_ERROR".to_owned() },
        error: if success { None } else { Some("device rejected command".to_owned()) },
        details: serde_json::json!({}),
        ts: now_ts(),
    }
}

pub fn device_meta(device_id: &str, modules: &[&str]) -> DeviceMetaEnvelope {
    DeviceMetaEnvelope {
        device_id: device_id.to_owned(),
        modules: modules.iter().map(|m| m.to_string()).collect(),
        capabilities: serde_json::json!({}),
        labels: vec![],
        version: "1.0.0".to_owned(),
        metadata: serde_json::json!({}),
        ts: now_ts(),
    }
}
