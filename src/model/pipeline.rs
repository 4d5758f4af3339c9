//! Pipelines and their runs (§4.6, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::error::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub name: String,
    pub plugin_id: String,
    pub config: Json,
    /// Cron-style schedule; `None` means manual-trigger only.
    pub schedule: Option<String>,
    pub is_enabled: bool,
    pub next_scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Claimed,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled)
    }

    /// Validates a transition against the state machine in §4.7. Terminal
    /// states are sinks; `Claimed`/`Running` may fall back to `Pending`
    /// only via expiry, modeled by the caller incrementing `attempt`.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        match (self, next) {
            (Pending, Claimed) => true,
            (Claimed, Running) => true,
            (Claimed, Pending) => true, // expire
            (Running, Pending) => true, // expire
            (Running, Succeeded | Failed) => true,
            (Pending | Claimed | Running, Cancelled) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub status: RunStatus,
    pub claimed_by: Option<String>,
    pub claim_expiry_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub attempt: i32,
    pub scheduled_for: DateTime<Utc>,
}

impl PipelineRun {
    pub fn transition(&mut self, next: RunStatus) -> Result<(), Error> {
        if !self.status.can_transition_to(next) {
            return Err(Error::validation(
                "status",
                format!("illegal transition {:?} -> {next:?}", self.status),
            ));
        }
        self.status = next;
        Ok(())
    }
}

/// `ChangeType` counts reported per category by a sync run's summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Updated,
    NoChange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_sinks() {
        for terminal in [RunStatus::Succeeded, RunStatus::Failed, RunStatus::Cancelled] {
            for next in [
                RunStatus::Pending,
                RunStatus::Claimed,
                RunStatus::Running,
                RunStatus::Succeeded,
                RunStatus::Failed,
                RunStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal:?} -> {next:?}");
            }
        }
    }

    #[test]
    fn happy_path_transitions() {
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Claimed));
        assert!(RunStatus::Claimed.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Succeeded));
    }

    #[test]
    fn expiry_returns_to_pending() {
        assert!(RunStatus::Claimed.can_transition_to(RunStatus::Pending));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Pending));
    }

    #[test]
    fn cancellation_from_any_nonterminal_state() {
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Cancelled));
        assert!(RunStatus::Claimed.can_transition_to(RunStatus::Cancelled));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Cancelled));
    }
}
