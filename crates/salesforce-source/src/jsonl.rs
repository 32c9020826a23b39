//! JSONL-backed source connector.
//!
//! Each line of the file is one tagged [`SourceRecord`]:
//!
//! ```text
//! {"type":"Account","id":"001000000000000001","name":"Acme","last_modified":"2024-01-01T00:00:00Z"}
//! {"type":"Contact","id":"003000000000000002","last_name":"Doe","email":"jd@acme.test","account_id":"001000000000000001","last_modified":"2024-01-01T00:00:01Z"}
//! ```
//!
//! Blank lines are skipped. Writes rewrite the whole file through a
//! temporary file and a rename.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use sync_core::{ObjectType, Result, SourceId, SourceRecord, SyncError};
use tokio::sync::Mutex;

use crate::{CreatedRecord, SourceConnector};

pub struct JsonlSource {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<SourceRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SyncError::source_unavailable(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )))
            }
        };

        let mut records = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: SourceRecord = serde_json::from_str(line).map_err(|e| {
                SyncError::source_unavailable(format!(
                    "Invalid record at {}:{}: {e}",
                    self.path.display(),
                    index + 1
                ))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    async fn save(&self, records: &[SourceRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut content = String::new();
        for record in records {
            content.push_str(&serde_json::to_string(record)?);
            content.push('\n');
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Next id for `object_type`, continuing the numeric suffix of existing ids.
fn next_id(records: &[SourceRecord], object_type: ObjectType) -> SourceId {
    let prefix = match object_type {
        ObjectType::Account => "001",
        ObjectType::Contact => "003",
    };
    let last = records
        .iter()
        .filter_map(|r| r.id().as_str().get(3..)?.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    SourceId::new(format!("{prefix}{:015}", last + 1))
}

/// Modification time later than every stored one.
fn next_timestamp(records: &[SourceRecord]) -> DateTime<Utc> {
    let now = Utc::now();
    match records.iter().map(SourceRecord::last_modified).max() {
        Some(latest) if now <= latest => latest + Duration::milliseconds(1),
        _ => now,
    }
}

#[async_trait]
impl SourceConnector for JsonlSource {
    async fn query(
        &self,
        since: DateTime<Utc>,
        object_type: ObjectType,
    ) -> Result<Vec<SourceRecord>> {
        let records = self.load().await?;
        Ok(records
            .into_iter()
            .filter(|r| r.object_type() == object_type && r.last_modified() > since)
            .collect())
    }

    async fn create(&self, record: SourceRecord) -> Result<CreatedRecord> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;

        let id = next_id(&records, record.object_type());
        let last_modified = next_timestamp(&records);
        records.push(record.with_identity(id.clone(), last_modified));
        self.save(&records).await?;

        tracing::debug!("Created {id} in {}", self.path.display());
        Ok(CreatedRecord { id, last_modified })
    }

    async fn get(&self, object_type: ObjectType, id: &SourceId) -> Result<Option<SourceRecord>> {
        let records = self.load().await?;
        Ok(records
            .into_iter()
            .find(|r| r.object_type() == object_type && r.id() == id))
    }

    async fn delete(&self, ids: &[SourceId]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        let before = records.len();
        records.retain(|r| !ids.contains(r.id()));
        if records.len() != before {
            self.save(&records).await?;
        }
        Ok(())
    }
}
