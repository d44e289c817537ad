//! Wire envelope types for the device-orchestration bus and their strict
//! schema validation (component C2).
//!
//! All payloads are UTF-8 JSON maps carrying an ISO-8601 `ts` field. Rejection
//! is hard: an invalid envelope is never delivered to a handler (see
//! [`validate`]).

pub mod dlq;
pub mod envelope;
pub mod http;
pub mod params;
pub mod validate;

pub use dlq::{DlqAction, DlqCommandRequest, DlqCommandResponse};
pub use envelope::{
    AckCode, AckEnvelope, CommandEnvelope, DeviceMetaEnvelope, DeviceStatusEnvelope,
    HeartbeatEnvelope, ModuleStatusEnvelope,
};
pub use http::HttpErrorEnvelope;
pub use params::{ParamBound, ParamBoundTable, IMAGE_SHIFT_BOUND, KEYSTONE_BOUND};
pub use validate::{ValidationError, validate_ack, validate_command, validate_command_params,
    validate_device_meta, validate_device_status, validate_heartbeat, validate_module_status};

/// Frozen ack `code` values (§6).
pub mod error_codes {
    pub const OK: &str = "OK";
    pub const BAD_JSON: &str = "BAD_JSON";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const DEVICE_ERROR: &str = "DEVICE_ERROR";
    pub const MODULE_ERROR: &str = "MODULE_ERROR";
    pub const EXCEPTION: &str = "EXCEPTION";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const DISPATCHED: &str = "DISPATCHED";
    pub const SCHEDULED: &str = "SCHEDULED";
    pub const IN_USE: &str = "IN_USE";
    pub const NOT_OWNER: &str = "NOT_OWNER";
    pub const BAD_ACTION: &str = "BAD_ACTION";
}

/// Bus topic helpers (namespace `/lab`, §6).
pub mod topics {
    pub fn device_meta(device_id: &str) -> String {
        format!("/lab/device/{device_id}/meta")
    }
    pub fn device_status(device_id: &str) -> String {
        format!("/lab/device/{device_id}/status")
    }
    pub fn device_heartbeat(device_id: &str) -> String {
        format!("/lab/device/{device_id}/heartbeat")
    }
    pub fn module_status(device_id: &str, module: &str) -> String {
        format!("/lab/device/{device_id}/{module}/status")
    }
    pub fn module_cmd(device_id: &str, module: &str) -> String {
        format!("/lab/device/{device_id}/{module}/cmd")
    }
    pub fn module_ack(device_id: &str, module: &str) -> String {
        format!("/lab/device/{device_id}/{module}/ack")
    }
    pub fn dlq_scope(device_id: Option<&str>, module: Option<&str>) -> String {
        match (device_id, module) {
            (Some(d), Some(m)) => format!("/lab/dlq/{d}/{m}"),
            (Some(d), None) => format!("/lab/dlq/{d}/device"),
            _ => "/lab/dlq/orchestrator".to_owned(),
        }
    }
    pub const DLQ_CMD: &str = "/lab/dlq/cmd";
    pub const DLQ_RESPONSE: &str = "/lab/dlq/response";
    pub const HEALTH_TEST: &str = "/lab/orchestrator/health/test";
}
