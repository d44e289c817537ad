//! Dead-letter queue (C7, §4.7) — persists failure records, republishes a
//! copy onto a scope-derived topic, and serves the operator control surface
//! on `/lab/dlq/cmd` / `/lab/dlq/response`.

use std::sync::Arc;

use chrono::Utc;
use hub_core::{DeadLetterRecord, FailureReason};
use hub_protocol::{DlqAction, DlqCommandRequest, DlqCommandResponse};
use tracing::{info, warn};

use crate::bus::{BusClient, DeliveryQuality};
use crate::metrics;
use crate::repo::PersistenceGateway;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub struct DeadLetterQueue {
    repo: PersistenceGateway,
    bus: Arc<dyn BusClient>,
    max_retries: u32,
}

impl DeadLetterQueue {
    pub fn new(repo: PersistenceGateway, bus: Arc<dyn BusClient>, max_retries: u32) -> Self {
        Self { repo, bus, max_retries }
    }

    /// Persists `record` and republishes a copy to the scope-derived topic
    /// (§4.7's routing table). Publish failure is logged, not propagated —
    /// the record is already durable.
    pub async fn record(&self, record: DeadLetterRecord) {
        let topic = record.dlq_topic();
        warn!(
            reason = record.failure_reason.as_str(),
            device_id = record.device_id.as_deref().unwrap_or(""),
            req_id = record.req_id.as_deref().unwrap_or(""),
            %topic,
            "routing message to dead-letter queue"
        );
        if let Err(err) = self.repo.insert_dead_letter(&record).await {
            warn!(%err, "failed to persist dead-letter record");
        }
        let payload = serde_json::to_value(&record).unwrap_or(serde_json::Value::Null);
        let payload_len = serde_json::to_vec(&payload).map(|bytes| bytes.len()).unwrap_or(0);
        if let Err(err) = self.bus.publish(&topic, payload, DeliveryQuality::AtLeastOnce, false).await {
            warn!(%err, %topic, "failed to publish dead-letter record");
        } else {
            metrics::record_bus_publish(&topic, payload_len);
        }
    }

    pub fn build_record(
        original_topic: impl Into<String>,
        original_payload: serde_json::Value,
        reason: FailureReason,
        error_message: impl Into<String>,
        device_id: Option<String>,
        module: Option<String>,
        req_id: Option<String>,
    ) -> DeadLetterRecord {
        DeadLetterRecord::new(original_topic, original_payload, reason, error_message, Utc::now())
            .with_scope(device_id, module, req_id)
    }

    /// Handles one operator control message from `/lab/dlq/cmd`, returning
    /// the response to publish on `/lab/dlq/response`.
    pub async fn handle_control(&self, req: DlqCommandRequest) -> DlqCommandResponse {
        match req.action {
            DlqAction::Retry => self.handle_retry(req).await,
            DlqAction::Purge => self.handle_purge(req).await,
            DlqAction::Stats => self.handle_stats(req).await,
            DlqAction::List => self.handle_list(req).await,
        }
    }

    async fn handle_retry(&self, req: DlqCommandRequest) -> DlqCommandResponse {
        let Some(dlq_id) = req.dlq_id else {
            return err_response(req.req_id, "retry requires dlq_id");
        };
        let record = match self.repo.get_dead_letter(dlq_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return err_response(req.req_id, "no such dead-letter record"),
            Err(e) => return err_response(req.req_id, &e.to_string()),
        };
        if record.retry_count >= self.max_retries {
            return err_response(req.req_id, FailureReason::RetryExhausted.as_str());
        }
        let retry_payload_len = serde_json::to_vec(&record.original_payload).map(|bytes| bytes.len()).unwrap_or(0);
        if let Err(err) = self
            .bus
            .publish(&record.original_topic, record.original_payload.clone(), DeliveryQuality::AtLeastOnce, false)
            .await
        {
            return err_response(req.req_id, &format!("republish failed: {err}"));
        }
        metrics::record_bus_publish(&record.original_topic, retry_payload_len);
        let updated = self.repo.record_dead_letter_retry(dlq_id, Utc::now()).await;
        info!(%dlq_id, topic = %record.original_topic, "dead-letter record retried");
        match updated {
            Ok(Some(record)) => DlqCommandResponse {
                req_id: req.req_id,
                success: true,
                message: None,
                data: serde_json::json!({"dlq_id": dlq_id, "retry_count": record.retry_count}),
            },
            Ok(None) => err_response(req.req_id, "record disappeared mid-retry"),
            Err(e) => err_response(req.req_id, &e.to_string()),
        }
    }

    async fn handle_purge(&self, req: DlqCommandRequest) -> DlqCommandResponse {
        let days = req.older_than_days.unwrap_or(0);
        match self.repo.purge_dead_letters_older_than(days, Utc::now()).await {
            Ok(purged) => DlqCommandResponse {
                req_id: req.req_id,
                success: true,
                message: None,
                data: serde_json::json!({"purged": purged}),
            },
            Err(e) => err_response(req.req_id, &e.to_string()),
        }
    }

    async fn handle_stats(&self, req: DlqCommandRequest) -> DlqCommandResponse {
        match self.repo.dead_letter_stats().await {
            Ok(stats) => DlqCommandResponse {
                req_id: req.req_id,
                success: true,
                message: None,
                data: serde_json::json!({
                    "total": stats.total,
                    "by_reason": stats.by_reason.into_iter().collect::<std::collections::HashMap<_, _>>(),
                }),
            },
            Err(e) => err_response(req.req_id, &e.to_string()),
        }
    }

    async fn handle_list(&self, req: DlqCommandRequest) -> DlqCommandResponse {
        let device_id = req.filters.as_ref().and_then(|f| f.get("device_id")).and_then(|v| v.as_str());
        let limit = req.filters.as_ref().and_then(|f| f.get("limit")).and_then(|v| v.as_i64()).unwrap_or(100);
        match self.repo.list_dead_letters(device_id, None, limit).await {
            Ok(records) => DlqCommandResponse {
                req_id: req.req_id,
                success: true,
                message: None,
                data: serde_json::to_value(&records).unwrap_or(serde_json::Value::Null),
            },
            Err(e) => err_response(req.req_id, &e.to_string()),
        }
    }
}

fn err_response(req_id: String, message: &str) -> DlqCommandResponse {
    DlqCommandResponse { req_id, success: false, message: Some(message.to_owned()), data: serde_json::Value::Null }
}

/// §4.7 scope-to-topic routing, mirrored here only for the unit test below —
/// the canonical implementation is `DeadLetterRecord::dlq_topic`.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_record_carries_scope_into_topic() {
        let record = DeadLetterQueue::build_record(
            "/lab/device/rig-1/ndi/cmd",
            serde_json::json!({}),
            FailureReason::Timeout,
            "no ack",
            Some("rig-1".into()),
            Some("ndi".into()),
            Some("r1".into()),
        );
        assert_eq!(record.dlq_topic(), "/lab/dlq/rig-1/ndi");
    }

    #[test]
    fn retry_exhausted_is_refused_past_max_retries() {
        let mut record = DeadLetterQueue::build_record("t", serde_json::json!({}), FailureReason::Timeout, "x", None, None, None);
        record.retry_count = DEFAULT_MAX_RETRIES;
        assert!(record.retry_count >= DEFAULT_MAX_RETRIES);
    }
}
