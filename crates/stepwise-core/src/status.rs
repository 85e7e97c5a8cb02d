//! Scenario and step status machines
//!
//! Scenario edges:
//! - `NotStarted -> InProgress` after parsing and planning
//! - `InProgress -> Completed` once every step completed
//! - `InProgress -> WaitingForClarification` when a step fails
//! - `WaitingForClarification -> InProgress` after a successful recovery
//! - `WaitingForClarification -> Failed` when recovery gives up
//! - `InProgress -> Failed` on a fault, `NotStarted -> Failed` when parsing or planning fails

use crate::error::TransitionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a scenario run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    /// Created, command not parsed yet
    #[default]
    NotStarted,
    /// Steps are executing
    InProgress,
    /// Every step completed
    Completed,
    /// Terminal failure
    Failed,
    /// A step failed and recovery is running
    WaitingForClarification,
}

impl ScenarioStatus {
    /// Every status, in declaration order
    pub const ALL: [Self; 5] = [
        Self::NotStarted,
        Self::InProgress,
        Self::Completed,
        Self::Failed,
        Self::WaitingForClarification,
    ];

    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::WaitingForClarification => "waiting_for_clarification",
        }
    }

    /// Check if no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not executed yet
    #[default]
    NotStarted,
    /// Executing its own action sequence
    InProgress,
    /// Goal condition reached
    Completed,
    /// Goal condition not reached
    Failed,
    /// Recovery actions are being applied
    Retrying,
}

impl StepStatus {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statuses reachable from `from` in one transition
#[must_use]
pub fn allowed_transitions(from: ScenarioStatus) -> &'static [ScenarioStatus] {
    use ScenarioStatus::{Completed, Failed, InProgress, NotStarted, WaitingForClarification};
    match from {
        NotStarted => &[InProgress, Failed],
        InProgress => &[Completed, WaitingForClarification, Failed],
        WaitingForClarification => &[InProgress, Failed],
        Completed | Failed => &[],
    }
}

/// Validate a scenario status transition
///
/// # Errors
/// `TransitionError::Illegal` when `to` is not reachable from `from`
pub fn validate_transition(from: ScenarioStatus, to: ScenarioStatus) -> Result<(), TransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError::Illegal { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        use ScenarioStatus::*;
        assert!(validate_transition(NotStarted, InProgress).is_ok());
        assert!(validate_transition(InProgress, WaitingForClarification).is_ok());
        assert!(validate_transition(WaitingForClarification, InProgress).is_ok());
        assert!(validate_transition(InProgress, Completed).is_ok());
    }

    #[test]
    fn terminal_states_are_final() {
        for to in ScenarioStatus::ALL {
            assert!(validate_transition(ScenarioStatus::Completed, to).is_err());
            assert!(validate_transition(ScenarioStatus::Failed, to).is_err());
        }
        assert!(ScenarioStatus::Completed.is_terminal());
        assert!(!ScenarioStatus::WaitingForClarification.is_terminal());
    }

    #[test]
    fn cannot_complete_while_waiting() {
        let err = validate_transition(
            ScenarioStatus::WaitingForClarification,
            ScenarioStatus::Completed,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "illegal scenario transition waiting_for_clarification -> completed"
        );
    }

    #[test]
    fn serde_names_match_display() {
        for status in ScenarioStatus::ALL {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, status.as_str());
        }
        assert_eq!(
            serde_json::to_value(StepStatus::Retrying).unwrap(),
            "retrying"
        );
    }
}
