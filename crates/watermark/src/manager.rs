//! Watermark store with monotonic advance semantics.

use chrono::Utc;
use std::sync::Arc;
use sync_core::{Result, SyncError};
use tokio::sync::Mutex;

use crate::{DefaultWatermark, StoredWatermark, Watermark, WatermarkBackend};

/// Per-flow watermark over a storage backend.
///
/// - `get` returns the stored value, or the configured default on first use.
/// - `advance` refuses to move the watermark backwards.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use watermark::{DefaultWatermark, FilesystemStore, WatermarkStore};
///
/// let backend = Arc::new(FilesystemStore::new(".crm-sync-watermarks"));
/// let store = WatermarkStore::new(backend, "triggerFlow", &DefaultWatermark::parse("now-10s")?)?;
///
/// let current = store.get().await?;
/// store.advance(latest_synced_modification.into()).await?;
/// ```
pub struct WatermarkStore {
    backend: Arc<dyn WatermarkBackend>,
    flow: String,
    default: Watermark,
    // Serializes get-compare-store in `advance`
    write_lock: Mutex<()>,
}

impl WatermarkStore {
    /// Create a store whose first-use value is `default` resolved right now.
    pub fn new(
        backend: Arc<dyn WatermarkBackend>,
        flow: impl Into<String>,
        default: &DefaultWatermark,
    ) -> Result<Self> {
        Ok(Self::with_default(backend, flow, default.resolve(Utc::now())?))
    }

    /// Create a store with an already resolved first-use value.
    pub fn with_default(
        backend: Arc<dyn WatermarkBackend>,
        flow: impl Into<String>,
        default: Watermark,
    ) -> Self {
        Self {
            backend,
            flow: flow.into(),
            default,
            write_lock: Mutex::new(()),
        }
    }

    pub fn flow(&self) -> &str {
        &self.flow
    }

    /// Value returned by `get` until the first advance.
    pub fn default_watermark(&self) -> Watermark {
        self.default
    }

    /// Current watermark of the flow.
    pub async fn get(&self) -> Result<Watermark> {
        Ok(self
            .backend
            .read_watermark(&self.flow)
            .await?
            .map(|stored| stored.watermark)
            .unwrap_or(self.default))
    }

    /// Move the watermark forward to `new`.
    ///
    /// Advancing to the current value is a no-op write. Advancing to an
    /// earlier value fails with [`SyncError::OutOfOrderWatermark`] and leaves
    /// the stored value untouched.
    pub async fn advance(&self, new: Watermark) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let current = self.get().await?;
        if new < current {
            tracing::error!(
                "Refusing to move watermark of flow '{}' backwards: current {}, attempted {}",
                self.flow,
                current,
                new
            );
            return Err(SyncError::OutOfOrderWatermark {
                current: current.timestamp(),
                attempted: new.timestamp(),
            });
        }

        self.write(new).await?;
        tracing::info!(
            "Advanced watermark of flow '{}' from {} to {}",
            self.flow,
            current,
            new
        );
        Ok(())
    }

    /// Overwrite the watermark regardless of ordering.
    ///
    /// Only for operator-driven replays; the engine itself never calls this.
    pub async fn reset(&self, to: Watermark) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(to).await?;
        tracing::warn!("Watermark of flow '{}' reset to {}", self.flow, to);
        Ok(())
    }

    /// Stored entry with its last update time, if the flow ever advanced.
    pub async fn stored(&self) -> Result<Option<StoredWatermark>> {
        self.backend.read_watermark(&self.flow).await
    }

    async fn write(&self, watermark: Watermark) -> Result<()> {
        let stored = StoredWatermark {
            flow: self.flow.clone(),
            watermark,
            updated_at: Utc::now(),
        };
        self.backend.store_watermark(&stored).await
    }
}
