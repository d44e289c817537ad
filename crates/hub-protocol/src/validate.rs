//! Strict envelope validation (component C2, §4.2).
//!
//! Validation is hard: any violation produces a [`ValidationError`] and the
//! envelope must never reach a handler (§4.1, §7 `ValidationFailure`).

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::envelope::{
    AckEnvelope, CommandEnvelope, DeviceMetaEnvelope, DeviceStatusEnvelope, HeartbeatEnvelope,
    ModuleStatusEnvelope,
};

pub const MAX_PARAMS_BYTES: usize = 64 * 1024;
pub const MAX_DETAILS_BYTES: usize = 32 * 1024;
pub const MAX_FIELDS_BYTES: usize = 16 * 1024;
pub const MAX_ERROR_LEN: usize = 1000;
pub const MAX_LABELS: usize = 20;
pub const MAX_LABEL_LEN: usize = 50;

static ACTOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(api|orchestrator|user|host:.+)$").unwrap());
static DEVICE_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());
static MODULE_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: {reason}")]
    Field { field: &'static str, reason: String },
    #[error("payload exceeds {limit} bytes ({actual} bytes)")]
    TooLarge { limit: usize, actual: usize },
    #[error("invalid ISO-8601 timestamp: {0}")]
    BadTimestamp(String),
}

fn field(name: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::Field { field: name, reason: reason.into() }
}

fn check_len(name: &'static str, s: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    let len = s.chars().count();
    if len < min || len > max {
        return Err(field(name, format!("length {len} not in [{min}, {max}]")));
    }
    Ok(())
}

fn check_json_bytes(name: &'static str, value: &serde_json::Value, limit: usize) -> Result<(), ValidationError> {
    let bytes = serde_json::to_vec(value).map_err(|e| field(name, e.to_string()))?;
    if bytes.len() > limit {
        return Err(ValidationError::TooLarge { limit, actual: bytes.len() });
    }
    Ok(())
}

pub fn check_ts(ts: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ValidationError::BadTimestamp(ts.to_owned()))
}

/// Validate a command envelope (§4.2).
pub fn validate_command(env: &CommandEnvelope) -> Result<(), ValidationError> {
    check_len("req_id", &env.req_id, 1, 255)?;
    if !ACTOR_RE.is_match(&env.actor) {
        return Err(field("actor", "must match api|orchestrator|user|host:<id>"));
    }
    check_ts(&env.ts)?;
    check_len("action", &env.action, 1, 100)?;
    check_json_bytes("params", &env.params, MAX_PARAMS_BYTES)?;
    Ok(())
}

/// Validate a command's params against a per-action bound table (§4.2a),
/// e.g. the projector module's keystone (`±40`) and image-shift (`±100`)
/// adjustment bounds. Call after [`validate_command`]; actions with no
/// registered bound always pass.
pub fn validate_command_params(
    env: &CommandEnvelope,
    bounds: &crate::params::ParamBoundTable,
) -> Result<(), ValidationError> {
    bounds.check_params(&env.params)
}

/// Validate an ack envelope (§4.2).
pub fn validate_ack(env: &AckEnvelope) -> Result<(), ValidationError> {
    check_len("req_id", &env.req_id, 1, 255)?;
    check_len("action", &env.action, 1, 100)?;
    if !ACTOR_RE.is_match(&env.actor) {
        return Err(field("actor", "must match api|orchestrator|user|host:<id>"));
    }
    if crate::envelope::AckCode::parse(&env.code).is_none() {
        return Err(field("code", format!("unrecognized ack code {:?}", env.code)));
    }
    if let Some(error) = &env.error {
        check_len("error", error, 0, MAX_ERROR_LEN)?;
    }
    check_json_bytes("details", &env.details, MAX_DETAILS_BYTES)?;
    check_ts(&env.ts)?;
    Ok(())
}

/// Validate a device-meta envelope (§4.2).
pub fn validate_device_meta(env: &DeviceMetaEnvelope) -> Result<(), ValidationError> {
    if !DEVICE_ID_RE.is_match(&env.device_id) {
        return Err(field("device_id", "must match ^[A-Za-z0-9_-]+$"));
    }
    for module in &env.modules {
        if !MODULE_NAME_RE.is_match(module) {
            return Err(field("modules", format!("{module:?} must match ^[A-Za-z0-9_]+$")));
        }
    }
    if env.labels.len() > MAX_LABELS {
        return Err(field("labels", format!("at most {MAX_LABELS} labels allowed")));
    }
    for label in &env.labels {
        check_len("labels[]", label, 0, MAX_LABEL_LEN)?;
    }
    check_ts(&env.ts)?;
    Ok(())
}

/// Validate a device-status envelope (§4.2).
pub fn validate_device_status(env: &DeviceStatusEnvelope) -> Result<(), ValidationError> {
    if !DEVICE_ID_RE.is_match(&env.device_id) {
        return Err(field("device_id", "must match ^[A-Za-z0-9_-]+$"));
    }
    check_ts(&env.ts)?;
    Ok(())
}

/// Validate a module-status envelope (§4.2).
pub fn validate_module_status(env: &ModuleStatusEnvelope) -> Result<(), ValidationError> {
    check_len("state", &env.state, 1, 50)?;
    check_json_bytes("fields", &env.fields, MAX_FIELDS_BYTES)?;
    check_ts(&env.ts)?;
    Ok(())
}

/// Validate a heartbeat payload.
pub fn validate_heartbeat(env: &HeartbeatEnvelope) -> Result<(), ValidationError> {
    check_ts(&env.ts)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{AckEnvelope, CommandEnvelope};

    fn base_command() -> CommandEnvelope {
        CommandEnvelope {
            req_id: "r1".into(),
            actor: "api".into(),
            ts: "2026-07-28T12:00:00Z".into(),
            action: "start".into(),
            params: serde_json::json!({}),
        }
    }

    #[test]
    fn accepts_well_formed_command() {
        assert!(validate_command(&base_command()).is_ok());
    }

    #[test]
    fn rejects_empty_req_id() {
        let mut env = base_command();
        env.req_id = String::new();
        assert!(validate_command(&env).is_err());
    }

    #[test]
    fn rejects_bad_timestamp() {
        let mut env = base_command();
        env.ts = "not-a-time".into();
        assert!(matches!(validate_command(&env), Err(ValidationError::BadTimestamp(_))));
    }

    #[test]
    fn rejects_host_actor_without_suffix_but_allows_host_prefixed() {
        let mut env = base_command();
        env.actor = "host:rig-7".into();
        assert!(validate_command(&env).is_ok());
        env.actor = "hostile".into();
        assert!(validate_command(&env).is_err());
    }

    #[test]
    fn params_at_64kib_accepted_64kib_plus_one_rejected() {
        let mut env = base_command();
        // one key whose value is a string padding the serialized size to the boundary
        let pad_for = |total: usize| -> String {
            // serialized form: {"p":"XXXX..."} — compute padding to hit `total` bytes exactly
            let overhead = serde_json::to_vec(&serde_json::json!({"p": ""})).unwrap().len();
            "x".repeat(total - overhead)
        };
        env.params = serde_json::json!({"p": pad_for(MAX_PARAMS_BYTES)});
        assert!(validate_command(&env).is_ok());

        env.params = serde_json::json!({"p": pad_for(MAX_PARAMS_BYTES) + "x"});
        assert!(matches!(validate_command(&env), Err(ValidationError::TooLarge { .. })));
    }

    #[test]
    fn ack_requires_known_code() {
        let ack = AckEnvelope {
            req_id: "r1".into(),
            success: true,
            action: "start".into(),
            actor: "host:rig-1".into(),
            code: "NOT_A_CODE".into(),
            error: None,
            details: serde_json::json!({}),
            ts: "2026-07-28T12:00:00Z".into(),
        };
        assert!(validate_ack(&ack).is_err());
    }
}
