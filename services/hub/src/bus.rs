//! Message-bus client seam (C1).
//!
//! The concrete broker (MQTT, NATS, ...) is an external collaborator per
//! SPEC_FULL §1 Non-goals, so this module defines the `BusClient` trait the
//! rest of the hub programs against, plus an in-process implementation used
//! for local running and tests. Topic matching and the reconnect-with-backoff
//! loop are the real engineering surface here and are exercised directly.
//!
//! Grounded on `services/forwarder::uplink::UplinkSession::connect` for the
//! reconnect shape and on `hub_core::retry::RetryPolicy` for the backoff math.

use std::future::Future;
use std::sync::Arc;

use hub_core::retry::RetryPolicy;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryQuality {
    AtMostOnce,
    AtLeastOnce,
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("not connected")]
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Value,
}

#[async_trait::async_trait]
pub trait BusClient: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        payload: Value,
        qos: DeliveryQuality,
        retain: bool,
    ) -> Result<(), BusError>;

    fn subscribe(&self, pattern: &str) -> BusSubscription;

    /// Whether the client currently holds a live broker connection. Used by
    /// the readiness probe (C9, §4.9); the in-process bus is always
    /// connected.
    fn is_connected(&self) -> bool {
        true
    }
}

/// A live subscription to a (possibly wildcarded) topic pattern. Messages
/// published before the pattern matches are dropped, mirroring normal
/// pub/sub semantics — callers that need replay use `resume_cursor` handling
/// at a higher layer (out of scope here, see SPEC_FULL §C1 Non-goals).
pub struct BusSubscription {
    pattern: String,
    rx: broadcast::Receiver<InboundMessage>,
}

impl BusSubscription {
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        loop {
            match self.rx.recv().await {
                Ok(msg) if topic_matches(&self.pattern, &msg.topic) => return Some(msg),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, pattern = %self.pattern, "bus subscriber lagged, messages dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Single-process pub/sub bus standing in for the real broker. Every
/// publish fans out to every subscriber; each subscriber filters by its own
/// pattern. Always "connected" — reconnect semantics are exercised instead
/// via [`connect_with_backoff`] against a real transport.
pub struct InProcessBus {
    tx: broadcast::Sender<InboundMessage>,
}

impl InProcessBus {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(4096);
        Arc::new(InProcessBus { tx })
    }
}

impl Default for Arc<InProcessBus> {
    fn default() -> Self {
        InProcessBus::new()
    }
}

#[async_trait::async_trait]
impl BusClient for InProcessBus {
    async fn publish(
        &self,
        topic: &str,
        payload: Value,
        _qos: DeliveryQuality,
        _retain: bool,
    ) -> Result<(), BusError> {
        // A send with no subscribers is not an error: operator tooling and
        // the engine may not both be listening at boot.
        let _ = self.tx.send(InboundMessage { topic: topic.to_owned(), payload });
        Ok(())
    }

    fn subscribe(&self, pattern: &str) -> BusSubscription {
        BusSubscription { pattern: pattern.to_owned(), rx: self.tx.subscribe() }
    }
}

/// MQTT-style topic matching: `+` matches exactly one segment, `#` matches
/// the rest of the topic (must be the final segment).
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let pat: Vec<&str> = pattern.split('/').collect();
    let top: Vec<&str> = topic.split('/').collect();
    let mut pi = 0;
    let mut ti = 0;
    while pi < pat.len() {
        if pat[pi] == "#" {
            return true;
        }
        if ti >= top.len() {
            return false;
        }
        if pat[pi] != "+" && pat[pi] != top[ti] {
            return false;
        }
        pi += 1;
        ti += 1;
    }
    ti == top.len()
}

/// Connects (or reconnects) to a transport with jittered exponential backoff,
/// retrying forever — surviving disconnects is the point, so there is no
/// attempt ceiling. The attempt counter saturates at `policy.max_attempts` so
/// the delay stays capped instead of overflowing.
pub async fn connect_with_backoff<T, Fut, F>(policy: &RetryPolicy, mut connect: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BusError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match connect().await {
            Ok(conn) => {
                info!(attempt, "bus connection established");
                return conn;
            }
            Err(err) => {
                let capped = attempt.min(policy.max_attempts.max(1));
                let delay = policy.delay_for_attempt(capped);
                warn!(attempt, delay_ms = delay.as_millis() as u64, %err, "bus connect failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `+` matches a single segment, `#` matches everything remaining.
    #[test]
    fn wildcard_matching_follows_mqtt_rules() {
        assert!(topic_matches("lab/+/status", "lab/rig-1/status"));
        assert!(!topic_matches("lab/+/status", "lab/rig-1/sub/status"));
        assert!(topic_matches("lab/dlq/#", "lab/dlq/rig-1/module"));
        assert!(topic_matches("lab/dlq/#", "lab/dlq/orchestrator"));
        assert!(!topic_matches("lab/dlq/rig-1", "lab/dlq/rig-2"));
    }

    /// Published messages reach only subscribers whose pattern matches.
    #[tokio::test]
    async fn publish_is_filtered_per_subscriber_pattern() {
        let bus = InProcessBus::new();
        let mut cmds = bus.subscribe("lab/+/module/cmd");
        let mut status = bus.subscribe("lab/+/status");

        bus.publish("lab/rig-1/module/cmd", serde_json::json!({"a": 1}), DeliveryQuality::AtLeastOnce, false)
            .await
            .unwrap();
        bus.publish("lab/rig-1/status", serde_json::json!({"b": 2}), DeliveryQuality::AtMostOnce, false)
            .await
            .unwrap();

        let got_cmd = cmds.recv().await.unwrap();
        assert_eq!(got_cmd.topic, "lab/rig-1/module/cmd");
        let got_status = status.recv().await.unwrap();
        assert_eq!(got_status.topic, "lab/rig-1/status");
    }

    /// A flaky transport that fails twice then succeeds is reconnected to
    /// exactly on the third attempt, with no ceiling on total attempts.
    #[tokio::test]
    async fn connect_with_backoff_retries_until_success() {
        let policy = RetryPolicy::default().with_max_attempts(5);
        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let attempts2 = attempts.clone();
        let result: u32 = connect_with_backoff(&policy, move || {
            let attempts = attempts2.clone();
            async move {
                let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(BusError::Disconnected)
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, 3);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
