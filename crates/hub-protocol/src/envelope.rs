//! The five envelope kinds of §4.2, plus their shared `ts` convention.
//!
//! Unlike the teacher's `WsMessage` (a single tagged enum covering every
//! message kind on one socket), these envelopes are addressed by bus topic
//! rather than a `kind` tag, so each is its own top-level JSON object.

use serde::{Deserialize, Serialize};

/// Command envelope, published by a caller onto a module's `cmd` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub req_id: String,
    pub actor: String,
    pub ts: String,
    pub action: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Ack envelope, published by a device onto a module's `ack` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckEnvelope {
    pub req_id: String,
    pub success: bool,
    pub action: String,
    pub actor: String,
    #[serde(default = "default_ack_code")]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
    pub ts: String,
}

fn default_ack_code() -> String {
    crate::error_codes::OK.to_owned()
}

/// Strongly-typed view of the enumerated `code` values (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCode {
    Ok,
    BadJson,
    BadRequest,
    DeviceError,
    ModuleError,
    Exception,
    Timeout,
    Dispatched,
    Scheduled,
    InUse,
    NotOwner,
    BadAction,
}

impl AckCode {
    pub fn as_str(self) -> &'static str {
        use crate::error_codes::*;
        match self {
            AckCode::Ok => OK,
            AckCode::BadJson => BAD_JSON,
            AckCode::BadRequest => BAD_REQUEST,
            AckCode::DeviceError => DEVICE_ERROR,
            AckCode::ModuleError => MODULE_ERROR,
            AckCode::Exception => EXCEPTION,
            AckCode::Timeout => TIMEOUT,
            AckCode::Dispatched => DISPATCHED,
            AckCode::Scheduled => SCHEDULED,
            AckCode::InUse => IN_USE,
            AckCode::NotOwner => NOT_OWNER,
            AckCode::BadAction => BAD_ACTION,
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        use crate::error_codes::*;
        Some(match code {
            s if s == OK => AckCode::Ok,
            s if s == BAD_JSON => AckCode::BadJson,
            s if s == BAD_REQUEST => AckCode::BadRequest,
            s if s == DEVICE_ERROR => AckCode::DeviceError,
            s if s == MODULE_ERROR => AckCode::ModuleError,
            s if s == EXCEPTION => AckCode::Exception,
            s if s == TIMEOUT => AckCode::Timeout,
            s if s == DISPATCHED => AckCode::Dispatched,
            s if s == SCHEDULED => AckCode::Scheduled,
            s if s == IN_USE => AckCode::InUse,
            s if s == NOT_OWNER => AckCode::NotOwner,
            s if s == BAD_ACTION => AckCode::BadAction,
            _ => return None,
        })
    }
}

/// Device-meta envelope: full or partial device registration/update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetaEnvelope {
    pub device_id: String,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub capabilities: serde_json::Value,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub ts: String,
}

fn default_version() -> String {
    "unknown".to_owned()
}

/// Device-status envelope: coarse online/uptime/memory snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatusEnvelope {
    pub device_id: String,
    pub online: bool,
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
}

/// Module-status envelope, published on `/lab/device/{id}/{module}/status`.
///
/// `device_id`/`module` are not carried in the body — they're implied by the
/// topic — but are attached here once the bus client resolves the topic, so
/// downstream code (C5) can treat this as a self-describing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleStatusEnvelope {
    #[serde(skip)]
    pub device_id: String,
    #[serde(skip)]
    pub module: String,
    pub state: String,
    pub online: bool,
    #[serde(default)]
    pub fields: serde_json::Value,
    pub ts: String,
}

/// Heartbeat payload on `/lab/device/{id}/heartbeat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatEnvelope {
    #[serde(skip)]
    pub device_id: String,
    pub online: bool,
    pub ts: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}
