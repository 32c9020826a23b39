//! Watermark storage trait and types
//!
//! This module defines the WatermarkBackend trait for storage-agnostic
//! watermark persistence, plus shared types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sync_core::Result;

use crate::Watermark;

/// Watermark data stored in backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredWatermark {
    /// Flow the watermark belongs to (e.g. "triggerFlow")
    pub flow: String,
    /// The watermark value
    pub watermark: Watermark,
    /// Timestamp when the watermark was last written
    pub updated_at: DateTime<Utc>,
}

/// Trait for watermark storage operations.
///
/// Backends only persist and load; ordering rules live in
/// [`crate::WatermarkStore`]. Implementations:
/// - Filesystem storage (`FilesystemStore`)
/// - Process memory (`MemoryStore`)
#[async_trait]
pub trait WatermarkBackend: Send + Sync {
    /// Store the watermark for a flow, replacing any previous value.
    async fn store_watermark(&self, stored: &StoredWatermark) -> Result<()>;

    /// Read the watermark for a flow.
    ///
    /// Returns None if no watermark has been stored yet.
    async fn read_watermark(&self, flow: &str) -> Result<Option<StoredWatermark>>;
}
