//! Job monitor: observe a running batch job.

use std::time::Duration;
use sync_core::{Result, SyncError};
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

use super::{JobState, JobSummary};

/// Read-only view of a dispatched job.
///
/// Handles are cheap to clone. Waiting on a handle, or dropping it, never
/// affects the job itself.
#[derive(Clone)]
pub struct JobHandle {
    job_id: Uuid,
    receiver: watch::Receiver<JobSummary>,
}

impl JobHandle {
    pub(crate) fn new(job_id: Uuid, receiver: watch::Receiver<JobSummary>) -> Self {
        Self { job_id, receiver }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn state(&self) -> JobState {
        self.summary().state
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Snapshot of the job's current progress.
    ///
    /// A job whose task ended without publishing a terminal state is
    /// reported as FAILED.
    pub fn summary(&self) -> JobSummary {
        let mut summary = self.receiver.borrow().clone();
        if !summary.state.is_terminal() && self.receiver.has_changed().is_err() {
            summary.state = JobState::Failed;
            summary
                .fault
                .get_or_insert_with(|| "job task ended before reaching a terminal state".into());
        }
        summary
    }

    /// Wait until the job is SUCCEEDED or FAILED, checking every
    /// `poll_interval`.
    ///
    /// Fails with [`SyncError::JobTimeout`] if `timeout` passes first. The
    /// job keeps running in that case.
    pub async fn await_termination(
        &self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<JobSummary> {
        let started = Instant::now();
        // A timeout too large to represent means waiting without a deadline.
        let deadline = started.checked_add(timeout);
        let poll_interval = poll_interval.max(Duration::from_millis(1));

        loop {
            let summary = self.summary();
            if summary.state.is_terminal() {
                return Ok(summary);
            }

            let now = Instant::now();
            let Some(deadline) = deadline else {
                tokio::time::sleep(poll_interval).await;
                continue;
            };
            if now >= deadline {
                tracing::warn!(
                    "Gave up waiting for job {} after {:?} in state {}",
                    self.job_id,
                    timeout,
                    summary.state
                );
                return Err(SyncError::JobTimeout {
                    job_id: self.job_id,
                    waited_ms: now.duration_since(started).as_millis() as u64,
                    state: summary.state.to_string(),
                });
            }

            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }

    /// The summary if the job SUCCEEDED, [`SyncError::JobFailed`] otherwise.
    pub fn assert_successful(&self) -> Result<JobSummary> {
        let summary = self.summary();
        if summary.state == JobState::Succeeded {
            Ok(summary)
        } else {
            Err(summary.to_failed_error())
        }
    }
}
