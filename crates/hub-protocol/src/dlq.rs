//! Operator control envelopes for the dead-letter queue (§4.7).
//!
//! Operator commands arrive on `/lab/dlq/cmd`; responses are published to
//! `/lab/dlq/response` carrying the operator's `req_id`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqAction {
    Retry,
    Purge,
    Stats,
    List,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqCommandRequest {
    pub req_id: String,
    pub action: DlqAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dlq_id: Option<uuid::Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub older_than_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqCommandResponse {
    pub req_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}
