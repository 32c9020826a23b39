//! Timer-driven flow scheduling.
//!
//! The scheduler only decides *when* a flow runs. What a run does is up to
//! the [`Flow`], normally a [`SyncEngine`]. Stopping a flow stops its timer;
//! a job already dispatched by it keeps running to completion.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{Result, SyncError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crm_sync_salesforce_source::SourceConnector;
use crm_sync_siebel_sink::TargetConnector;

use crate::config::SyncConfig;
use crate::engine::{CycleOutcome, SyncEngine};

/// Something the scheduler can trigger.
#[async_trait]
pub trait Flow: Send + Sync {
    async fn trigger(&self) -> Result<CycleOutcome>;
}

#[async_trait]
impl<S, T> Flow for SyncEngine<S, T>
where
    S: SourceConnector + 'static,
    T: TargetConnector + 'static,
{
    async fn trigger(&self) -> Result<CycleOutcome> {
        self.run_once().await
    }
}

/// When a flow's timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Wait before the first tick.
    pub start_delay: Duration,
    /// Time between ticks. Ticks missed while a cycle runs are skipped.
    pub interval: Duration,
}

impl Schedule {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            start_delay: config.poll_start_delay(),
            interval: config.poll_interval(),
        }
    }
}

struct ScheduledFlow {
    flow: Arc<dyn Flow>,
    schedule: Schedule,
    timer: Option<JoinHandle<()>>,
}

/// Registry of named flows and their timers.
#[derive(Default)]
pub struct Scheduler {
    flows: HashMap<String, ScheduledFlow>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a flow under `name`. Names must be unique.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        flow: Arc<dyn Flow>,
        schedule: Schedule,
    ) -> Result<()> {
        let name = name.into();
        if self.flows.contains_key(&name) {
            return Err(SyncError::config(format!(
                "Flow '{name}' is already registered"
            )));
        }
        self.flows.insert(
            name,
            ScheduledFlow {
                flow,
                schedule,
                timer: None,
            },
        );
        Ok(())
    }

    pub fn flow_names(&self) -> Vec<&str> {
        self.flows.keys().map(String::as_str).collect()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.flows
            .get(name)
            .and_then(|f| f.timer.as_ref())
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Start the flow's timer. Starting a running flow does nothing.
    pub fn start(&mut self, name: &str) -> Result<()> {
        let running = self.is_running(name);
        let scheduled = self.get_mut(name)?;
        if running {
            tracing::warn!("Flow '{name}' is already started");
            return Ok(());
        }

        let flow = scheduled.flow.clone();
        let schedule = scheduled.schedule;
        let flow_name = name.to_string();

        tracing::info!(
            "Starting flow '{name}': first poll in {:?}, then every {:?}",
            schedule.start_delay,
            schedule.interval
        );

        scheduled.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(schedule.start_delay).await;

            let mut interval_timer = tokio::time::interval(schedule.interval);
            interval_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval_timer.tick().await;
                run_cycle(&flow_name, flow.as_ref()).await;
            }
        }));
        Ok(())
    }

    /// Stop the flow's timer. A job it already dispatched is not cancelled.
    pub fn stop(&mut self, name: &str) -> Result<()> {
        let scheduled = self.get_mut(name)?;
        if let Some(timer) = scheduled.timer.take() {
            timer.abort();
            tracing::info!("Stopped flow '{name}'");
        }
        Ok(())
    }

    /// Stop every flow's timer.
    pub fn stop_all(&mut self) {
        for (name, scheduled) in &mut self.flows {
            if let Some(timer) = scheduled.timer.take() {
                timer.abort();
                tracing::info!("Stopped flow '{name}'");
            }
        }
    }

    /// Trigger one cycle of the flow now, independent of its timer.
    pub async fn run_once(&self, name: &str) -> Result<CycleOutcome> {
        let flow = self
            .flows
            .get(name)
            .map(|f| f.flow.clone())
            .ok_or_else(|| SyncError::UnknownFlow(name.to_string()))?;
        flow.trigger().await
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut ScheduledFlow> {
        self.flows
            .get_mut(name)
            .ok_or_else(|| SyncError::UnknownFlow(name.to_string()))
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn run_cycle(name: &str, flow: &dyn Flow) {
    match flow.trigger().await {
        Ok(CycleOutcome::Dispatched(job)) => {
            tracing::info!("Flow '{name}' dispatched job {}", job.job_id());
        }
        Ok(outcome) => {
            tracing::debug!("Flow '{name}' cycle: {outcome:?}");
        }
        Err(e) if e.is_cycle_fault() => {
            tracing::warn!("Flow '{name}' cycle abandoned, retrying on next tick: {e}");
        }
        Err(e) => {
            tracing::error!("Flow '{name}' cycle failed: {e}");
        }
    }
}
