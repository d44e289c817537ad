//! Schedule definitions (§3) — secondary to the command engine, validated
//! the same way `original_source`'s `ScheduleDefinition.schedule_expr`
//! validator does (exactly 5 cron parts; ISO timestamp for `once`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Once,
    Cron,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleCommand {
    pub device_id: String,
    pub action: String,
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub name: String,
    pub device_id: Option<String>,
    pub module: Option<String>,
    pub schedule_type: ScheduleType,
    pub expression: String,
    pub commands: Vec<ScheduleCommand>,
    pub active: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: u64,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("schedule name must not be empty")]
    EmptyName,
    #[error("schedule must have at least one command")]
    NoCommands,
    #[error("cron expression must have exactly 5 parts, got {0}")]
    BadCronArity(usize),
    #[error("invalid ISO-8601 timestamp for a one-shot schedule: {0}")]
    BadOnceExpression(String),
}

impl Schedule {
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.name.trim().is_empty() {
            return Err(ScheduleError::EmptyName);
        }
        if self.commands.is_empty() {
            return Err(ScheduleError::NoCommands);
        }
        match self.schedule_type {
            ScheduleType::Cron => {
                let parts = self.expression.split_whitespace().count();
                if parts != 5 {
                    return Err(ScheduleError::BadCronArity(parts));
                }
            }
            ScheduleType::Once => {
                if chrono::DateTime::parse_from_rfc3339(&self.expression).is_err() {
                    return Err(ScheduleError::BadOnceExpression(self.expression.clone()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(expression: &str, schedule_type: ScheduleType) -> Schedule {
        Schedule {
            name: "nightly-reset".into(),
            device_id: Some("rig-1".into()),
            module: None,
            schedule_type,
            expression: expression.into(),
            commands: vec![ScheduleCommand { device_id: "rig-1".into(), action: "reset".into(), params: serde_json::json!({}) }],
            active: true,
            last_run: None,
            next_run: None,
            run_count: 0,
        }
    }

    #[test]
    fn cron_with_five_parts_is_accepted() {
        assert!(base("0 3 * * *", ScheduleType::Cron).validate().is_ok());
    }

    #[test]
    fn cron_with_four_or_six_parts_is_rejected() {
        assert!(matches!(base("0 3 * *", ScheduleType::Cron).validate(), Err(ScheduleError::BadCronArity(4))));
        assert!(matches!(base("0 3 * * * *", ScheduleType::Cron).validate(), Err(ScheduleError::BadCronArity(6))));
    }

    #[test]
    fn once_requires_valid_timestamp() {
        assert!(base("2026-08-01T03:00:00Z", ScheduleType::Once).validate().is_ok());
        assert!(base("not-a-time", ScheduleType::Once).validate().is_err());
    }
}
