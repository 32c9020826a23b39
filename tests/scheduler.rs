//! Scheduler timing and control surface.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crm_sync::salesforce::SourceConnector;
use crm_sync::sync_core::{Account, Result, SyncError};
use crm_sync::testing::{
    init_tracing, memory_watermarks, test_config, InMemorySource, InMemoryTarget, TEST_FLOW,
};
use crm_sync::watermark::Watermark;
use crm_sync::{CycleOutcome, Flow, JobState, Schedule, Scheduler, SyncEngine};

/// Flow that only counts how often it was triggered.
#[derive(Default)]
struct CountingFlow {
    triggers: AtomicUsize,
}

impl CountingFlow {
    fn count(&self) -> usize {
        self.triggers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Flow for CountingFlow {
    async fn trigger(&self) -> Result<CycleOutcome> {
        self.triggers.fetch_add(1, Ordering::SeqCst);
        Ok(CycleOutcome::Empty {
            watermark: Watermark::new(Utc::now()),
            advanced_to: None,
        })
    }
}

fn schedule() -> Schedule {
    Schedule {
        start_delay: Duration::from_secs(20),
        interval: Duration::from_secs(10),
    }
}

#[tokio::test(start_paused = true)]
async fn test_start_delay_then_interval() {
    let flow = Arc::new(CountingFlow::default());
    let mut scheduler = Scheduler::new();
    scheduler
        .register(TEST_FLOW, flow.clone(), schedule())
        .unwrap();
    scheduler.start(TEST_FLOW).unwrap();
    assert!(scheduler.is_running(TEST_FLOW));

    tokio::time::sleep(Duration::from_secs(19)).await;
    assert_eq!(flow.count(), 0, "no cycle before the start delay");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(flow.count(), 1, "first cycle right after the start delay");

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(flow.count(), 2);

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(flow.count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_ticks() {
    let flow = Arc::new(CountingFlow::default());
    let mut scheduler = Scheduler::new();
    scheduler
        .register(TEST_FLOW, flow.clone(), schedule())
        .unwrap();
    scheduler.start(TEST_FLOW).unwrap();

    tokio::time::sleep(Duration::from_secs(21)).await;
    assert_eq!(flow.count(), 1);

    scheduler.stop(TEST_FLOW).unwrap();
    assert!(!scheduler.is_running(TEST_FLOW));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(flow.count(), 1);

    // Manual triggers still work on a stopped flow.
    scheduler.run_once(TEST_FLOW).await.unwrap();
    assert_eq!(flow.count(), 2);

    // And the timer can be restarted.
    scheduler.start(TEST_FLOW).unwrap();
    tokio::time::sleep(Duration::from_secs(21)).await;
    assert_eq!(flow.count(), 3);
    scheduler.stop_all();
}

#[tokio::test]
async fn test_unknown_and_duplicate_flows() {
    let mut scheduler = Scheduler::new();
    assert!(matches!(
        scheduler.run_once("nope").await.unwrap_err(),
        SyncError::UnknownFlow(name) if name == "nope"
    ));
    assert!(scheduler.start("nope").is_err());
    assert!(scheduler.stop("nope").is_err());

    scheduler
        .register(TEST_FLOW, Arc::new(CountingFlow::default()), schedule())
        .unwrap();
    assert!(scheduler
        .register(TEST_FLOW, Arc::new(CountingFlow::default()), schedule())
        .is_err());
    assert_eq!(scheduler.flow_names(), vec![TEST_FLOW]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_does_not_cancel_running_job() {
    init_tracing();
    let source = Arc::new(InMemorySource::new());
    let target = Arc::new(InMemoryTarget::new());
    // Query plus create stays within test_config's 5s step timeout.
    target.set_latency(Duration::from_secs(2));
    source
        .create(Account::new("Acme").into())
        .await
        .unwrap();

    let engine = Arc::new(SyncEngine::new(
        source.clone(),
        target.clone(),
        memory_watermarks(Watermark::new(Utc::now() - ChronoDuration::seconds(10))),
        test_config(),
    ));

    let mut scheduler = Scheduler::new();
    scheduler
        .register(TEST_FLOW, engine.clone(), Schedule::from_config(engine.config()))
        .unwrap();
    scheduler.start(TEST_FLOW).unwrap();

    // test_config: first poll after 2s.
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    let job = engine.last_job().await.expect("first cycle dispatched a job");
    assert_eq!(job.state(), JobState::Running);

    scheduler.stop(TEST_FLOW).unwrap();

    let summary = job
        .await_termination(Duration::from_secs(60), Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(summary.state, JobState::Succeeded);
    assert_eq!(summary.created, 1);
    assert_eq!(source.query_count(), 2, "no further polls after stop");
}

#[tokio::test(start_paused = true)]
async fn test_ticks_during_running_job_are_skipped() {
    init_tracing();
    let source = Arc::new(InMemorySource::new());
    let target = Arc::new(InMemoryTarget::new());
    // Each target call takes longer than the poll interval.
    target.set_latency(Duration::from_millis(1_500));
    source
        .create(Account::new("Slow Co").into())
        .await
        .unwrap();

    let engine = Arc::new(SyncEngine::new(
        source.clone(),
        target.clone(),
        memory_watermarks(Watermark::new(Utc::now() - ChronoDuration::seconds(10))),
        test_config(),
    ));

    let mut scheduler = Scheduler::new();
    scheduler
        .register(TEST_FLOW, engine.clone(), Schedule::from_config(engine.config()))
        .unwrap();
    scheduler.start(TEST_FLOW).unwrap();

    // First tick at 2s dispatches; the job needs 3s (query + create).
    tokio::time::sleep(Duration::from_millis(4_500)).await;
    let job = engine.last_job().await.expect("job dispatched");
    assert_eq!(job.state(), JobState::Running);
    // Ticks at 3s and 4s were skipped without polling.
    assert_eq!(source.query_count(), 2);

    job.await_termination(Duration::from_secs(60), Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(job.state(), JobState::Succeeded);
    assert_eq!(target.count(crm_sync::sync_core::ObjectType::Account).await, 1);
    scheduler.stop_all();
}
