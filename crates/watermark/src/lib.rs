//! Watermark management for crm-sync
//!
//! A watermark is the "last successful sync time" cursor of a flow: every
//! source record modified at or before the watermark has already been
//! replicated. The change poller reads it before each cycle and the batch
//! dispatcher advances it once a job succeeds.
//!
//! # Architecture
//!
//! - [`Watermark`] - the timestamp value itself
//! - [`WatermarkStore`] - `get`/`advance` with the monotonicity check and
//!   first-use default
//! - [`WatermarkBackend`] - storage-agnostic persistence trait
//! - [`DefaultWatermark`] - parsed default expression (`now-10s`, RFC 3339)
//!
//! ## Storage Backends
//!
//! - `FilesystemStore` - Stores one JSON file per flow
//! - `MemoryStore` - Keeps watermarks in process memory (tests, dry runs)

mod expression;
mod filesystem;
mod manager;
mod memory;
pub mod store;


use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sync_core::{Result, SyncError};

pub use expression::DefaultWatermark;
pub use filesystem::FilesystemStore;
pub use manager::WatermarkStore;
pub use memory::MemoryStore;
pub use store::{StoredWatermark, WatermarkBackend};

/// Point in time up to which source changes have been synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self(timestamp)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }

    /// Convert to CLI-friendly string format, e.g. `2024-01-01T00:00:00.000Z`.
    ///
    /// Sub-millisecond precision is dropped; use serde for lossless storage.
    pub fn to_cli_string(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Parse from the format produced by [`Watermark::to_cli_string`].
    ///
    /// Any RFC 3339 timestamp is accepted and normalized to UTC.
    pub fn from_cli_string(s: &str) -> Result<Self> {
        let ts = DateTime::parse_from_rfc3339(s.trim())
            .map_err(|e| SyncError::config(format!("Invalid watermark '{s}': {e}")))?;
        Ok(Self::new(ts.with_timezone(&Utc)))
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_cli_string())
    }
}

impl From<DateTime<Utc>> for Watermark {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::new(ts)
    }
}
