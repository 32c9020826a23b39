//! Aggregate view of a batch job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use sync_core::{ObjectType, SourceId, SyncError, TargetId};
use uuid::Uuid;
use watermark::Watermark;

use super::JobState;

/// A record that could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub object_type: ObjectType,
    pub source_id: SourceId,
    pub error: String,
}

/// Progress and outcome of a batch job, as published to its handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub flow: String,
    pub state: JobState,
    /// Watermark the batch was polled from.
    pub watermark: Watermark,
    /// Records in the batch.
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    /// Parent accounts fetched from the source because a contact needed them.
    pub parents_synced: usize,
    /// Target id of every record loaded by this job, keyed by source id.
    pub correlations: BTreeMap<SourceId, TargetId>,
    pub failures: Vec<RecordFailure>,
    /// Stage-level fault that failed the whole job.
    pub fault: Option<String>,
    /// New watermark, set when the job succeeded.
    pub advanced_to: Option<Watermark>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobSummary {
    pub fn new(job_id: Uuid, flow: impl Into<String>, watermark: Watermark, total: usize) -> Self {
        Self {
            job_id,
            flow: flow.into(),
            state: JobState::Pending,
            watermark,
            total,
            created: 0,
            updated: 0,
            failed: 0,
            parents_synced: 0,
            correlations: BTreeMap::new(),
            failures: Vec::new(),
            fault: None,
            advanced_to: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Records of the batch that reached an outcome.
    pub fn processed(&self) -> usize {
        self.created + self.updated + self.failed
    }

    pub fn target_id(&self, source_id: &SourceId) -> Option<&TargetId> {
        self.correlations.get(source_id)
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|f| f.source_id.to_string())
            .collect()
    }

    /// The error a waiter sees when this job did not succeed.
    pub fn to_failed_error(&self) -> SyncError {
        SyncError::JobFailed {
            job_id: self.job_id,
            state: self.state.to_string(),
            failed: self.failed,
            failed_records: self.failed_ids(),
            fault: self.fault.clone(),
        }
    }
}
