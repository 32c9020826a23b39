//! In-memory watermark storage.

use async_trait::async_trait;
use std::collections::HashMap;
use sync_core::Result;
use tokio::sync::Mutex;

use crate::store::{StoredWatermark, WatermarkBackend};

/// Keeps watermarks in process memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredWatermark>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WatermarkBackend for MemoryStore {
    async fn store_watermark(&self, stored: &StoredWatermark) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(stored.flow.clone(), stored.clone());
        Ok(())
    }

    async fn read_watermark(&self, flow: &str) -> Result<Option<StoredWatermark>> {
        Ok(self.entries.lock().await.get(flow).cloned())
    }
}
