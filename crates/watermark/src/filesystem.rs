//! Filesystem-based watermark storage implementation.

use async_trait::async_trait;
use std::path::PathBuf;
use sync_core::Result;

use crate::store::{StoredWatermark, WatermarkBackend};

/// Filesystem implementation of WatermarkBackend trait.
///
/// Stores each flow's watermark as `watermark_{flow}.json` in a directory.
/// Writes go to a temporary file first and are renamed into place, so a
/// crash mid-write never leaves a truncated watermark behind.
pub struct FilesystemStore {
    dir: PathBuf,
}

impl FilesystemStore {
    /// Create a new FilesystemStore with the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the directory path.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn path_for(&self, flow: &str) -> PathBuf {
        self.dir.join(format!("watermark_{flow}.json"))
    }
}

#[async_trait]
impl WatermarkBackend for FilesystemStore {
    async fn store_watermark(&self, stored: &StoredWatermark) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(&stored.flow);
        let tmp = path.with_extension("json.tmp");

        tokio::fs::write(&tmp, serde_json::to_string_pretty(stored)?).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(
            "Stored watermark {} to {}",
            stored.watermark,
            path.display()
        );
        Ok(())
    }

    async fn read_watermark(&self, flow: &str) -> Result<Option<StoredWatermark>> {
        let path = self.path_for(flow);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
