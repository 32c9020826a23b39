//! Batch dispatcher: turns a candidate batch into a tracked job.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use sync_core::{ObjectType, Result, SourceId, SourceRecord, SyncError, TargetId};
use tokio::sync::watch;
use uuid::Uuid;
use watermark::{Watermark, WatermarkStore};

use crm_sync_salesforce_source::{CandidateBatch, SourceConnector};
use crm_sync_siebel_sink::{TargetConnector, TargetLoader, UpsertAction, Upserted};

use super::{JobHandle, JobState, JobSummary, RecordFailure};
use crate::config::{AccountSyncPolicy, SyncConfig};

/// Starts batch jobs and runs them on their own tasks.
///
/// Each job loads all Accounts of its batch, then all Contacts. Records within
/// a stage are loaded concurrently, up to `maxConcurrency` at a time.
pub struct BatchDispatcher<S: SourceConnector, T: TargetConnector> {
    inner: Arc<Inner<S, T>>,
}

impl<S: SourceConnector, T: TargetConnector> Clone for BatchDispatcher<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<S: SourceConnector, T: TargetConnector> {
    source: Arc<S>,
    loader: Arc<TargetLoader<T>>,
    watermarks: Arc<WatermarkStore>,
    config: SyncConfig,
}

/// Result of one record's enrich/transform/load step.
struct StepOutcome {
    object_type: ObjectType,
    source_id: SourceId,
    result: Result<Upserted>,
    /// Parent account loaded on demand, with its target id.
    parent: Option<(SourceId, TargetId)>,
}

impl<S, T> BatchDispatcher<S, T>
where
    S: SourceConnector + 'static,
    T: TargetConnector + 'static,
{
    pub fn new(
        source: Arc<S>,
        loader: Arc<TargetLoader<T>>,
        watermarks: Arc<WatermarkStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                loader,
                watermarks,
                config,
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Start a job for `batch` and return a handle to track it.
    ///
    /// The job is RUNNING by the time this returns. Must be called from
    /// within a tokio runtime.
    pub fn submit(&self, batch: CandidateBatch) -> Result<JobHandle> {
        let job_id = Uuid::new_v4();
        let mut summary = JobSummary::new(
            job_id,
            self.inner.watermarks.flow(),
            batch.watermark(),
            batch.len(),
        );

        summary.state = summary.state.transition(JobState::Running)?;
        summary.started_at = Some(Utc::now());

        tracing::info!(
            "Job {job_id} accepted: {} accounts, {} contacts since {}",
            batch.count(ObjectType::Account),
            batch.count(ObjectType::Contact),
            batch.watermark()
        );

        let (tx, rx) = watch::channel(summary);
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let run = AssertUnwindSafe(inner.run_job(batch, &tx)).catch_unwind().await;
            if let Err(payload) = run {
                let message = panic_message(&*payload);
                tracing::error!("Job {job_id} panicked: {message}");
                tx.send_modify(|summary| {
                    if let Ok(state) = summary.state.transition(JobState::Failed) {
                        summary.state = state;
                        summary.fault = Some(format!("job panicked: {message}"));
                        summary.finished_at = Some(Utc::now());
                    }
                });
            }
        });

        Ok(JobHandle::new(job_id, rx))
    }
}

impl<S, T> Inner<S, T>
where
    S: SourceConnector + 'static,
    T: TargetConnector + 'static,
{
    async fn run_job(self: Arc<Self>, batch: CandidateBatch, tx: &watch::Sender<JobSummary>) {
        let job_id = tx.borrow().job_id;
        let latest = batch.latest_modification();

        let (accounts, contacts): (Vec<_>, Vec<_>) = batch
            .into_records()
            .into_iter()
            .partition(|r| r.object_type() == ObjectType::Account);

        let mut fault = self
            .clone()
            .run_stage(ObjectType::Account, accounts, Arc::new(HashMap::new()), tx)
            .await
            .err();

        if fault.is_none() {
            let parents: HashMap<SourceId, TargetId> = tx
                .borrow()
                .correlations
                .iter()
                .map(|(s, t)| (s.clone(), t.clone()))
                .collect();
            fault = self
                .clone()
                .run_stage(ObjectType::Contact, contacts, Arc::new(parents), tx)
                .await
                .err();
        }

        let (failed, threshold) = (tx.borrow().failed, self.config.failure_threshold);
        let mut advanced_to = None;
        let final_state = if let Some(e) = &fault {
            tracing::error!("Job {job_id} failed with a stage fault: {e}");
            JobState::Failed
        } else if failed > threshold {
            tracing::error!(
                "Job {job_id} failed: {failed} failed records exceed threshold {threshold}"
            );
            JobState::Failed
        } else {
            match self.advance_watermark(latest).await {
                Ok(advanced) => {
                    advanced_to = advanced;
                    JobState::Succeeded
                }
                Err(e) => {
                    tracing::error!("Job {job_id} could not advance the watermark: {e}");
                    fault = Some(e);
                    JobState::Failed
                }
            }
        };

        tx.send_modify(|summary| {
            match summary.state.transition(final_state) {
                Ok(state) => summary.state = state,
                Err(e) => tracing::error!("Job {job_id}: {e}"),
            }
            summary.fault = fault.as_ref().map(ToString::to_string);
            summary.advanced_to = advanced_to;
            summary.finished_at = Some(Utc::now());
        });

        let summary = tx.borrow();
        tracing::info!(
            "Job {job_id} {}: {} created, {} updated, {} failed of {}",
            summary.state,
            summary.created,
            summary.updated,
            summary.failed,
            summary.total
        );
    }

    /// Advance the watermark to the latest modification time in the batch.
    async fn advance_watermark(&self, latest: Option<DateTime<Utc>>) -> Result<Option<Watermark>> {
        match latest {
            Some(ts) => {
                let watermark = Watermark::new(ts);
                self.watermarks.advance(watermark).await?;
                Ok(Some(watermark))
            }
            None => Ok(None),
        }
    }

    /// Load one stage. Returns the first stage-level fault, after which no
    /// further steps of the stage are started.
    async fn run_stage(
        self: Arc<Self>,
        object_type: ObjectType,
        records: Vec<SourceRecord>,
        parents: Arc<HashMap<SourceId, TargetId>>,
        tx: &watch::Sender<JobSummary>,
    ) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        tracing::debug!("Loading {} {object_type} records", records.len());

        let mut steps = stream::iter(records.into_iter().map(|record| {
            let inner = self.clone();
            let parents = parents.clone();
            async move { inner.run_step(record, parents).await }
        }))
        .buffer_unordered(self.config.max_concurrency.max(1));

        while let Some(outcome) = steps.next().await {
            if let Err(e) = &outcome.result {
                if e.is_stage_fault() {
                    let fault = SyncError::target_unavailable(format!(
                        "{} {}: {e}",
                        outcome.object_type, outcome.source_id
                    ));
                    tx.send_modify(|summary| record_outcome(summary, outcome));
                    return Err(fault);
                }
            }
            tx.send_modify(|summary| record_outcome(summary, outcome));
        }

        tracing::debug!("{object_type} stage complete");
        Ok(())
    }

    /// Enrich, transform and load one record within the step timeout.
    async fn run_step(
        self: Arc<Self>,
        record: SourceRecord,
        parents: Arc<HashMap<SourceId, TargetId>>,
    ) -> StepOutcome {
        let object_type = record.object_type();
        let source_id = record.id().clone();
        let step_timeout = self.config.step_timeout();

        let (result, parent) =
            match tokio::time::timeout(step_timeout, self.load(&record, &parents)).await {
                Ok(Ok((upserted, parent))) => (Ok(upserted), parent),
                Ok(Err(e)) => (Err(e), None),
                Err(_) => (
                    Err(SyncError::target_unavailable(format!(
                        "step exceeded {}ms",
                        step_timeout.as_millis()
                    ))),
                    None,
                ),
            };

        if let Err(e) = &result {
            tracing::warn!("Failed to load {object_type} {source_id}: {e}");
        }

        StepOutcome {
            object_type,
            source_id,
            result,
            parent,
        }
    }

    async fn load(
        &self,
        record: &SourceRecord,
        parents: &HashMap<SourceId, TargetId>,
    ) -> Result<(Upserted, Option<(SourceId, TargetId)>)> {
        let Some(parent_id) = record.parent_account_id() else {
            return Ok((self.loader.upsert(record).await?, None));
        };

        if let Some(account) = parents.get(parent_id) {
            let upserted = self.loader.upsert_linked(record, Some(account)).await?;
            return Ok((upserted, None));
        }

        match self.config.account_sync_policy {
            AccountSyncPolicy::Ignore => {
                tracing::debug!(
                    "Parent {parent_id} of {} not in batch, loading unlinked",
                    record.id()
                );
                Ok((self.loader.upsert(record).await?, None))
            }
            AccountSyncPolicy::SyncAccount => {
                let parent = self.sync_parent(parent_id).await?;
                let upserted = self
                    .loader
                    .upsert_linked(record, parent.as_ref().map(|(_, t)| t))
                    .await?;
                Ok((upserted, parent))
            }
        }
    }

    /// Fetch a parent account from the source and load it.
    async fn sync_parent(&self, parent_id: &SourceId) -> Result<Option<(SourceId, TargetId)>> {
        match self.source.get(ObjectType::Account, parent_id).await? {
            Some(account) => {
                let upserted = self.loader.upsert(&account).await?;
                tracing::debug!("Synced parent account {parent_id} as {}", upserted.record.id);
                Ok(Some((parent_id.clone(), upserted.record.id)))
            }
            None => {
                tracing::warn!("Parent account {parent_id} not found in source, loading unlinked");
                Ok(None)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn record_outcome(summary: &mut JobSummary, outcome: StepOutcome) {
    match outcome.result {
        Ok(upserted) => {
            match upserted.action {
                UpsertAction::Created => summary.created += 1,
                UpsertAction::Updated => summary.updated += 1,
            }
            summary
                .correlations
                .insert(outcome.source_id, upserted.record.id);
        }
        Err(e) => {
            summary.failed += 1;
            summary.failures.push(RecordFailure {
                object_type: outcome.object_type,
                source_id: outcome.source_id,
                error: e.to_string(),
            });
        }
    }
    if let Some((source_id, target_id)) = outcome.parent {
        if summary.correlations.insert(source_id, target_id).is_none() {
            summary.parents_synced += 1;
        }
    }
}
