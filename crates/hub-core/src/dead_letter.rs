//! Dead-letter record (§3, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    ValidationError,
    DeviceUnreachable,
    ModuleError,
    Timeout,
    ProcessingError,
    RetryExhausted,
    SchemaViolation,
    ResourceLocked,
    UnknownDevice,
    UnknownModule,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::ValidationError => "validation_error",
            FailureReason::DeviceUnreachable => "device_unreachable",
            FailureReason::ModuleError => "module_error",
            FailureReason::Timeout => "timeout",
            FailureReason::ProcessingError => "processing_error",
            FailureReason::RetryExhausted => "retry_exhausted",
            FailureReason::SchemaViolation => "schema_violation",
            FailureReason::ResourceLocked => "resource_locked",
            FailureReason::UnknownDevice => "unknown_device",
            FailureReason::UnknownModule => "unknown_module",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub id: Uuid,
    pub original_topic: String,
    pub original_payload: serde_json::Value,
    pub failure_reason: FailureReason,
    pub error_message: String,
    pub device_id: Option<String>,
    pub module: Option<String>,
    pub req_id: Option<String>,
    pub retry_count: u32,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl DeadLetterRecord {
    pub fn new(
        original_topic: impl Into<String>,
        original_payload: serde_json::Value,
        failure_reason: FailureReason,
        error_message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_topic: original_topic.into(),
            original_payload,
            failure_reason,
            error_message: error_message.into(),
            device_id: None,
            module: None,
            req_id: None,
            retry_count: 0,
            first_failed_at: now,
            last_failed_at: now,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_scope(mut self, device_id: Option<String>, module: Option<String>, req_id: Option<String>) -> Self {
        self.device_id = device_id;
        self.module = module;
        self.req_id = req_id;
        self
    }

    /// The topic this record publishes to, per §4.7's scope table.
    pub fn dlq_topic(&self) -> String {
        hub_protocol::topics::dlq_scope(self.device_id.as_deref(), self.module.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dlq_topic_routes_by_known_scope() {
        let now = Utc::now();
        let both = DeadLetterRecord::new("t", serde_json::json!({}), FailureReason::Timeout, "x", now)
            .with_scope(Some("d1".into()), Some("m1".into()), None);
        assert_eq!(both.dlq_topic(), "/lab/dlq/d1/m1");

        let device_only = DeadLetterRecord::new("t", serde_json::json!({}), FailureReason::Timeout, "x", now)
            .with_scope(Some("d1".into()), None, None);
        assert_eq!(device_only.dlq_topic(), "/lab/dlq/d1/device");

        let neither = DeadLetterRecord::new("t", serde_json::json!({}), FailureReason::Timeout, "x", now);
        assert_eq!(neither.dlq_topic(), "/lab/dlq/orchestrator");
    }
}
