//! Error taxonomy for the sync engine.
//!
//! Errors fall into four groups, and callers branch on the group rather than
//! on individual variants:
//!
//! - **cycle-level**: [`SyncError::SourceUnavailable`] abandons a poll cycle;
//!   the next tick retries from the same watermark.
//! - **stage-level**: [`SyncError::TargetUnavailable`] fails the whole batch job.
//! - **record-level**: [`SyncError::AmbiguousMatch`] and
//!   [`SyncError::MissingNaturalKey`] fail one record and are counted.
//! - **caller-visible**: [`SyncError::JobTimeout`] and [`SyncError::JobFailed`]
//!   describe what a waiter observed, not what the job did.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{NaturalKey, ObjectType, SourceId};

/// Errors that can occur while syncing records.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The source system could not be queried.
    #[error("Source unavailable: {message}")]
    SourceUnavailable { message: String },

    /// The target system could not be reached, or a step exceeded its timeout.
    #[error("Target unavailable: {message}")]
    TargetUnavailable { message: String },

    /// More than one target record carries the natural key.
    #[error("Ambiguous match for {key}: {matches} target records found")]
    AmbiguousMatch { key: NaturalKey, matches: usize },

    /// The record has no usable natural key (empty name or missing email).
    #[error("{object_type} {source_id} has no natural key")]
    MissingNaturalKey {
        object_type: ObjectType,
        source_id: SourceId,
    },

    /// A waiter gave up before the job reached a terminal state.
    #[error("Job {job_id} did not terminate within {waited_ms}ms (last state: {state})")]
    JobTimeout {
        job_id: Uuid,
        waited_ms: u64,
        state: String,
    },

    /// The job reached a terminal state other than success.
    #[error(
        "Job {job_id} finished {state}: {failed} failed record(s) [{}]{}",
        .failed_records.join(", "),
        .fault.as_ref().map(|f| format!(", fault: {f}")).unwrap_or_default()
    )]
    JobFailed {
        job_id: Uuid,
        state: String,
        failed: usize,
        failed_records: Vec<String>,
        fault: Option<String>,
    },

    /// Attempted to move the watermark backwards.
    #[error(
        "Out of order watermark: attempted {} but current is {}",
        .attempted.to_rfc3339(),
        .current.to_rfc3339()
    )]
    OutOfOrderWatermark {
        current: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },

    /// Invalid job state transition.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// No flow registered under the given name.
    #[error("Unknown flow: {0}")]
    UnknownFlow(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Create a source-unavailable error.
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
        }
    }

    /// Create a target-unavailable error.
    pub fn target_unavailable(message: impl Into<String>) -> Self {
        Self::TargetUnavailable {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error fails a whole batch job instead of a single record.
    pub fn is_stage_fault(&self) -> bool {
        matches!(self, Self::TargetUnavailable { .. })
    }

    /// Whether this error abandons the poll cycle before any job exists.
    pub fn is_cycle_fault(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(SyncError::target_unavailable("down").is_stage_fault());
        assert!(!SyncError::target_unavailable("down").is_cycle_fault());
        assert!(SyncError::source_unavailable("down").is_cycle_fault());

        let ambiguous = SyncError::AmbiguousMatch {
            key: NaturalKey::AccountName("Acme".to_string()),
            matches: 2,
        };
        assert!(!ambiguous.is_stage_fault());
        assert!(!ambiguous.is_cycle_fault());
    }

    #[test]
    fn test_job_failed_message_lists_records_and_fault() {
        let err = SyncError::JobFailed {
            job_id: Uuid::nil(),
            state: "failed".to_string(),
            failed: 2,
            failed_records: vec!["001A".to_string(), "003B".to_string()],
            fault: Some("Target unavailable: timeout".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("2 failed record(s) [001A, 003B]"));
        assert!(msg.contains("fault: Target unavailable: timeout"));
    }

    #[test]
    fn test_ambiguous_match_message() {
        let err = SyncError::AmbiguousMatch {
            key: NaturalKey::Email("a@example.com".to_string()),
            matches: 3,
        };
        assert_eq!(
            err.to_string(),
            "Ambiguous match for email 'a@example.com': 3 target records found"
        );
    }
}
