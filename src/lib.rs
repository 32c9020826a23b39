//! crm-sync library
//!
//! One-way, scheduled replication of Accounts and Contacts from Salesforce to
//! Siebel.
//!
//! # Flow
//!
//! ```text
//! Scheduler tick ──> SyncEngine::run_once
//!                       │
//!                       ├─ ChangePoller::poll        (records after the watermark)
//!                       ├─ BatchDispatcher::submit   (job: Accounts, then Contacts)
//!                       │     └─ TargetLoader::upsert  (match by natural key)
//!                       └─ on job success: WatermarkStore::advance
//! ```
//!
//! # Crates
//!
//! - `sync_core` - record model and error taxonomy
//! - `watermark` - watermark persistence
//! - `crm_sync_salesforce_source` - source connector and change poller
//! - `crm_sync_siebel_sink` - target connector, field mapping, matcher/loader
//!
//! # CLI Usage
//!
//! ```bash
//! # Poll on a timer until interrupted
//! crm-sync run --config crm-sync.toml
//!
//! # One cycle, waiting for the job to finish
//! crm-sync once --config crm-sync.toml --timeout 240s
//!
//! # Inspect or rewind the watermark
//! crm-sync watermark show --config crm-sync.toml
//! crm-sync watermark set --config crm-sync.toml 2024-01-01T00:00:00.000Z
//! ```

pub mod config;
pub mod engine;
pub mod job;
pub mod scheduler;
pub mod testing;

pub use config::{AccountSyncPolicy, FileConfig, SyncConfig};
pub use engine::{CycleOutcome, SyncEngine};
pub use job::{BatchDispatcher, JobHandle, JobState, JobSummary, RecordFailure};
pub use scheduler::{Flow, Schedule, Scheduler};

// Re-export member crates for convenience
pub use crm_sync_salesforce_source as salesforce;
pub use crm_sync_siebel_sink as siebel;
pub use sync_core;
pub use watermark;
