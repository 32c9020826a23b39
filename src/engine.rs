//! One poll-and-dispatch cycle of a flow.

use std::sync::Arc;
use sync_core::Result;
use tokio::sync::Mutex;
use uuid::Uuid;
use watermark::{Watermark, WatermarkStore};

use crm_sync_salesforce_source::{ChangePoller, SourceConnector};
use crm_sync_siebel_sink::{TargetConnector, TargetLoader};

use crate::config::SyncConfig;
use crate::job::{BatchDispatcher, JobHandle};

/// What a call to [`SyncEngine::run_once`] did.
#[derive(Clone)]
pub enum CycleOutcome {
    /// The previous cycle's job is still running, or another cycle is
    /// polling right now. Nothing was done.
    Skipped { active_job: Option<Uuid> },
    /// The poll found no changed records.
    Empty {
        watermark: Watermark,
        /// Set when the watermark was moved to the poll start time.
        advanced_to: Option<Watermark>,
    },
    /// A job was started for the changed records.
    Dispatched(JobHandle),
}

impl CycleOutcome {
    pub fn job(&self) -> Option<&JobHandle> {
        match self {
            CycleOutcome::Dispatched(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, CycleOutcome::Skipped { .. })
    }
}

impl std::fmt::Debug for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleOutcome::Skipped { active_job } => f
                .debug_struct("Skipped")
                .field("active_job", active_job)
                .finish(),
            CycleOutcome::Empty {
                watermark,
                advanced_to,
            } => f
                .debug_struct("Empty")
                .field("watermark", watermark)
                .field("advanced_to", advanced_to)
                .finish(),
            CycleOutcome::Dispatched(handle) => f
                .debug_tuple("Dispatched")
                .field(&handle.job_id())
                .finish(),
        }
    }
}

/// Polls the source and dispatches a batch job per cycle.
///
/// At most one cycle and its job are active at a time: a trigger while the
/// previous job is still running returns [`CycleOutcome::Skipped`].
pub struct SyncEngine<S: SourceConnector, T: TargetConnector> {
    poller: ChangePoller<S>,
    dispatcher: BatchDispatcher<S, T>,
    watermarks: Arc<WatermarkStore>,
    config: SyncConfig,
    active: Mutex<Option<JobHandle>>,
}

impl<S, T> SyncEngine<S, T>
where
    S: SourceConnector + 'static,
    T: TargetConnector + 'static,
{
    pub fn new(
        source: Arc<S>,
        target: Arc<T>,
        watermarks: Arc<WatermarkStore>,
        config: SyncConfig,
    ) -> Self {
        let poller = ChangePoller::new(source.clone(), watermarks.clone());
        let loader = Arc::new(TargetLoader::new(target));
        let dispatcher =
            BatchDispatcher::new(source, loader, watermarks.clone(), config.clone());
        Self {
            poller,
            dispatcher,
            watermarks,
            config,
            active: Mutex::new(None),
        }
    }

    pub fn flow(&self) -> &str {
        self.watermarks.flow()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn watermarks(&self) -> &Arc<WatermarkStore> {
        &self.watermarks
    }

    pub fn source(&self) -> &Arc<S> {
        self.poller.source()
    }

    /// Handle of the most recently dispatched job, if any.
    pub async fn last_job(&self) -> Option<JobHandle> {
        self.active.lock().await.clone()
    }

    /// Run one poll cycle.
    ///
    /// Errors from the poll ([`sync_core::SyncError::SourceUnavailable`])
    /// leave the watermark untouched; the next cycle retries from it.
    pub async fn run_once(&self) -> Result<CycleOutcome> {
        let Ok(mut active) = self.active.try_lock() else {
            tracing::debug!("Flow {} is already polling, skipping", self.flow());
            return Ok(CycleOutcome::Skipped { active_job: None });
        };

        if let Some(handle) = active.as_ref() {
            if !handle.is_terminal() {
                tracing::info!(
                    "Flow {}: job {} still {}, skipping cycle",
                    self.flow(),
                    handle.job_id(),
                    handle.state()
                );
                return Ok(CycleOutcome::Skipped {
                    active_job: Some(handle.job_id()),
                });
            }
        }

        let batch = match self.poller.poll().await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!("Flow {}: poll failed, will retry: {e}", self.flow());
                return Err(e);
            }
        };

        if batch.is_empty() {
            let watermark = batch.watermark();
            let mut advanced_to = None;
            if self.config.advance_watermark_on_empty {
                let candidate = Watermark::new(batch.polled_at());
                if candidate > watermark {
                    self.watermarks.advance(candidate).await?;
                    advanced_to = Some(candidate);
                }
            }
            tracing::debug!("Flow {}: no changes since {watermark}", self.flow());
            return Ok(CycleOutcome::Empty {
                watermark,
                advanced_to,
            });
        }

        let handle = self.dispatcher.submit(batch)?;
        *active = Some(handle.clone());
        Ok(CycleOutcome::Dispatched(handle))
    }
}
