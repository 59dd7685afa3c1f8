use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::models::batch::ObjectRef;

/// Suffix appended to an infra name to form its completion alarm name.
pub const ALARM_SUFFIX: &str = "-queue-empty";

/// Lifecycle state of the per-batch work-distribution infra.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum InfraState {
    Creating,
    Stable,
    Deleting,
    Deleted,
}

/// Registry record for one batch's ephemeral infra. Persisted in the
/// broker so the scheduled sweep can enumerate survivors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfraRecord {
    pub stack_id: String,
    pub batch_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub state: InfraState,
    /// Origin reference of the archive that spawned this batch.
    #[serde(default)]
    pub source: Option<ObjectRef>,
    /// Whether a completion notification was already published for this
    /// infra. Guards against duplicate notices across sampler restarts.
    #[serde(default)]
    pub notified: bool,
}

impl InfraRecord {
    pub fn alarm_name(&self) -> String {
        format!("{}{}", self.name, ALARM_SUFFIX)
    }
}

/// Provisioning lifecycle events consumed by the intake coordinator.
/// `Stable` and `Error` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfraEvent {
    Creating,
    Stable,
    Error(String),
}

/// Observed state of a completion alarm.
///
/// `NoData` means no depth samples exist at all — a stronger empty signal
/// than `Firing`, reserved for the sweep's lost-notification backstop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmState {
    Active,
    Firing,
    NoData,
}

/// Derive the infra name from its completion alarm name.
pub fn infra_name_from_alarm(alarm: &str) -> Option<&str> {
    alarm.strip_suffix(ALARM_SUFFIX)
}

/// Derive the batch id from an infra name given the app prefix.
pub fn batch_id_from_infra<'a>(infra: &'a str, app_name: &str) -> Option<&'a str> {
    infra.strip_prefix(app_name).and_then(|s| s.strip_prefix('-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alarm_name_round_trips() {
        let record = InfraRecord {
            stack_id: "s".to_string(),
            batch_id: "batch-1".to_string(),
            name: "camtrap-ingest-batch-1".to_string(),
            created_at: Utc::now(),
            state: InfraState::Stable,
            source: None,
            notified: false,
        };
        let alarm = record.alarm_name();
        assert_eq!(infra_name_from_alarm(&alarm), Some("camtrap-ingest-batch-1"));
    }

    #[test]
    fn batch_id_derivation() {
        assert_eq!(
            batch_id_from_infra("camtrap-ingest-batch-1", "camtrap-ingest"),
            Some("batch-1")
        );
        assert_eq!(batch_id_from_infra("other-batch-1", "camtrap-ingest"), None);
    }

    #[test]
    fn foreign_alarm_names_are_rejected() {
        assert_eq!(infra_name_from_alarm("camtrap-ingest-batch-1-other"), None);
    }
}
