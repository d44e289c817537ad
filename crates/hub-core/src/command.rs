//! Command record (§3) — the engine's primary persisted record.
//!
//! Invariants enforced here: `acked_at >= dispatched_at`; terminal statuses
//! carry a `success` value (timeout => false); `duration_ms` is computed from
//! `acked_at - dispatched_at` only when terminal and acked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Dispatched,
    Acked,
    Failed,
    Timeout,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CommandStatus::Acked | CommandStatus::Failed | CommandStatus::Timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: Uuid,
    pub req_id: String,
    pub device_id: String,
    pub module: Option<String>,
    pub actor: String,
    pub action: String,
    pub params: serde_json::Value,
    pub status: CommandStatus,
    pub dispatched_at: DateTime<Utc>,
    pub acked_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub error_message: Option<String>,
    pub response_details: serde_json::Value,
    pub duration_ms: Option<i64>,
}

impl Command {
    pub fn new_dispatched(
        req_id: impl Into<String>,
        device_id: impl Into<String>,
        module: Option<String>,
        actor: impl Into<String>,
        action: impl Into<String>,
        params: serde_json::Value,
        dispatched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            req_id: req_id.into(),
            device_id: device_id.into(),
            module,
            actor: actor.into(),
            action: action.into(),
            params,
            status: CommandStatus::Dispatched,
            dispatched_at,
            acked_at: None,
            success: None,
            error_message: None,
            response_details: serde_json::Value::Null,
            duration_ms: None,
        }
    }

    /// Finalize with an ack (§4.6 ack path). `acked_at` is clamped forward to
    /// `dispatched_at` to preserve the `acked_at >= dispatched_at` invariant
    /// even if the caller's clock is skewed.
    pub fn finalize_acked(
        &mut self,
        acked_at: DateTime<Utc>,
        success: bool,
        error_message: Option<String>,
        response_details: serde_json::Value,
    ) {
        let acked_at = acked_at.max(self.dispatched_at);
        self.status = if success { CommandStatus::Acked } else { CommandStatus::Failed };
        self.acked_at = Some(acked_at);
        self.success = Some(success);
        self.error_message = error_message;
        self.response_details = response_details;
        self.duration_ms = Some((acked_at - self.dispatched_at).num_milliseconds());
    }

    /// Finalize as a local failure with no device ack (unknown device/module,
    /// persistence failure rolled forward, etc).
    pub fn finalize_failed_locally(&mut self, at: DateTime<Utc>, error_message: impl Into<String>) {
        self.finalize_acked(at, false, Some(error_message.into()), serde_json::Value::Null);
        // finalize_acked sets status=Failed when success=false, which is correct here too.
    }

    /// Finalize on timeout (§4.6 timeout path). No `duration_ms` is recorded
    /// — the command never got an ack to measure against.
    pub fn finalize_timeout(&mut self) {
        self.status = CommandStatus::Timeout;
        self.success = Some(false);
        self.error_message = Some("no ack received before deadline".to_owned());
    }

    /// §8 invariant 2: terminal commands carry a `success` value consistent
    /// with their status.
    pub fn check_invariants(&self) -> bool {
        if !self.status.is_terminal() {
            return true;
        }
        match self.success {
            None => false,
            Some(success) => match self.status {
                CommandStatus::Acked => success,
                CommandStatus::Failed | CommandStatus::Timeout => !success,
                CommandStatus::Dispatched => unreachable!(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatched() -> Command {
        Command::new_dispatched("r1", "dev-1", Some("ndi".into()), "api", "start", serde_json::json!({}), Utc::now())
    }

    #[test]
    fn ack_sets_duration_and_success_invariant() {
        let mut cmd = dispatched();
        let dispatched_at = cmd.dispatched_at;
        cmd.finalize_acked(dispatched_at + chrono::Duration::milliseconds(120), true, None, serde_json::json!({"code": "OK"}));
        assert_eq!(cmd.status, CommandStatus::Acked);
        assert_eq!(cmd.duration_ms, Some(120));
        assert!(cmd.check_invariants());
    }

    #[test]
    fn failed_ack_flips_status_and_success_false() {
        let mut cmd = dispatched();
        let dispatched_at = cmd.dispatched_at;
        cmd.finalize_acked(dispatched_at + chrono::Duration::milliseconds(50), false, Some("device rejected".into()), serde_json::json!({}));
        assert_eq!(cmd.status, CommandStatus::Failed);
        assert!(cmd.check_invariants());
    }

    #[test]
    fn timeout_has_no_duration_and_success_false() {
        let mut cmd = dispatched();
        cmd.finalize_timeout();
        assert_eq!(cmd.status, CommandStatus::Timeout);
        assert_eq!(cmd.success, Some(false));
        assert_eq!(cmd.duration_ms, None);
        assert!(cmd.check_invariants());
    }

    #[test]
    fn acked_at_clamped_forward_when_earlier_than_dispatch() {
        let mut cmd = dispatched();
        let before = cmd.dispatched_at - chrono::Duration::seconds(5);
        cmd.finalize_acked(before, true, None, serde_json::json!({}));
        assert!(cmd.acked_at.unwrap() >= cmd.dispatched_at);
        assert_eq!(cmd.duration_ms, Some(0));
    }
}
