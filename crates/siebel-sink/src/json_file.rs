//! JSON-file-backed target connector.
//!
//! The file holds a JSON array of [`TargetRecord`]s. Every write rewrites
//! the file through a temporary file and a rename.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use sync_core::{ObjectType, Result, SourceId, SyncError, TargetId, TargetRecord};
use tokio::sync::Mutex;

use crate::{NaturalKeyFilter, TargetConnector, TargetFields};

pub struct JsonFileTarget {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored records.
    pub async fn load(&self) -> Result<Vec<TargetRecord>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                SyncError::target_unavailable(format!(
                    "Invalid target file {}: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(SyncError::target_unavailable(format!(
                "Failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, records: &[TargetRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(records)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Siebel-style row id following the largest one in use.
fn next_id(records: &[TargetRecord]) -> TargetId {
    let last = records
        .iter()
        .filter_map(|r| {
            let suffix = r.id.as_str().strip_prefix("1-")?;
            u64::from_str_radix(suffix, 16).ok()
        })
        .max()
        .unwrap_or(0);
    TargetId::new(format!("1-{:06X}", last + 1))
}

#[async_trait]
impl TargetConnector for JsonFileTarget {
    async fn query(&self, filter: &NaturalKeyFilter) -> Result<Vec<TargetRecord>> {
        let records = self.load().await?;
        Ok(records.into_iter().filter(|r| filter.matches(r)).collect())
    }

    async fn create(
        &self,
        object_type: ObjectType,
        fields: TargetFields,
        source_id: Option<&SourceId>,
    ) -> Result<TargetId> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        let id = next_id(&records);
        records.push(TargetRecord {
            id: id.clone(),
            object_type,
            fields,
            source_id: source_id.cloned(),
        });
        self.save(&records).await?;
        Ok(id)
    }

    async fn update(&self, id: &TargetId, fields: TargetFields) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        let record = records
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| SyncError::target_unavailable(format!("No target record {id}")))?;
        record.fields.extend(fields);
        self.save(&records).await
    }

    async fn delete(&self, object_type: ObjectType, ids: &[TargetId]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        let before = records.len();
        records.retain(|r| !(r.object_type == object_type && ids.contains(&r.id)));
        if records.len() != before {
            self.save(&records).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TargetLoader;
    use chrono::Utc;
    use std::sync::Arc;
    use sync_core::{Account, NaturalKey, SourceRecord};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upsert_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("siebel.json");
        let record = SourceRecord::from(Account::new("Acme").with_number_of_employees(10))
            .with_identity(SourceId::new("001A"), Utc::now());

        let first = TargetLoader::new(Arc::new(JsonFileTarget::new(&path)))
            .upsert(&record)
            .await
            .unwrap();
        assert_eq!(first.record.id.as_str(), "1-000001");

        let loader = TargetLoader::new(Arc::new(JsonFileTarget::new(&path)));
        let second = loader.upsert(&record).await.unwrap();
        assert_eq!(second.record.id, first.record.id);

        let found = loader
            .lookup(&NaturalKey::AccountName("Acme".into()))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source_id, Some(SourceId::new("001A")));
    }

    #[tokio::test]
    async fn test_delete_and_next_id() {
        let dir = TempDir::new().unwrap();
        let target = JsonFileTarget::new(dir.path().join("siebel.json"));

        let a = target
            .create(ObjectType::Account, TargetFields::new(), None)
            .await
            .unwrap();
        let b = target
            .create(ObjectType::Account, TargetFields::new(), None)
            .await
            .unwrap();
        assert_eq!(b.as_str(), "1-000002");

        target.delete(ObjectType::Contact, &[a.clone()]).await.unwrap();
        assert_eq!(target.load().await.unwrap().len(), 2);

        target.delete(ObjectType::Account, &[a]).await.unwrap();
        assert_eq!(target.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_id_fails() {
        let dir = TempDir::new().unwrap();
        let target = JsonFileTarget::new(dir.path().join("siebel.json"));
        let err = target
            .update(&TargetId::new("1-FFFFFF"), TargetFields::new())
            .await
            .unwrap_err();
        assert!(err.is_stage_fault());
    }
}
