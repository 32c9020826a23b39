//! Batch job state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use sync_core::{Result, SyncError};

/// Lifecycle of a batch job: `PENDING -> RUNNING -> {SUCCEEDED, FAILED}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Created, not yet accepted for execution
    #[default]
    Pending,
    /// Stages are being executed
    Running,
    /// All stages completed and failures stayed within the threshold
    Succeeded,
    /// Too many record failures, or a stage-level fault
    Failed,
}

impl JobState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }

    /// The state after moving to `next`, or [`SyncError::InvalidStateTransition`].
    pub fn transition(self, next: JobState) -> Result<JobState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(SyncError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid job state: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        assert_eq!(
            JobState::Pending.transition(JobState::Running).unwrap(),
            JobState::Running
        );
        assert_eq!(
            JobState::Running.transition(JobState::Succeeded).unwrap(),
            JobState::Succeeded
        );
        assert_eq!(
            JobState::Running.transition(JobState::Failed).unwrap(),
            JobState::Failed
        );
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [JobState::Succeeded, JobState::Failed] {
            assert!(terminal.is_terminal());
            for next in [
                JobState::Pending,
                JobState::Running,
                JobState::Succeeded,
                JobState::Failed,
            ] {
                assert!(terminal.transition(next).is_err());
            }
        }
    }

    #[test]
    fn test_pending_cannot_skip_running() {
        let err = JobState::Pending.transition(JobState::Succeeded).unwrap_err();
        match err {
            SyncError::InvalidStateTransition { from, to } => {
                assert_eq!(from, "PENDING");
                assert_eq!(to, "SUCCEEDED");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_display_and_parse() {
        assert_eq!(JobState::Running.to_string(), "RUNNING");
        assert_eq!("failed".parse::<JobState>().unwrap(), JobState::Failed);
        assert!("done".parse::<JobState>().is_err());
        assert_eq!(
            serde_json::to_string(&JobState::Succeeded).unwrap(),
            "\"SUCCEEDED\""
        );
    }
}
