//! Natural-key matching and idempotent upsert.

use std::collections::HashMap;
use std::sync::Arc;
use sync_core::{NaturalKey, Result, SourceRecord, SyncError, TargetId, TargetRecord};
use tokio::sync::Mutex;

use crate::{mapping, NaturalKeyFilter, TargetConnector};

/// What an upsert did in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Created,
    Updated,
}

/// Result of loading one source record.
#[derive(Debug, Clone)]
pub struct Upserted {
    /// The target record as written.
    pub record: TargetRecord,
    pub action: UpsertAction,
}

/// Matches source records to target records by natural key and writes them.
///
/// Matching rules:
/// - zero matches: create
/// - one match: update that record in place
/// - more than one: [`SyncError::AmbiguousMatch`], nothing is written
///
/// Upserts of the same natural key are serialized, so two copies of a record
/// in one batch cannot both take the create path.
pub struct TargetLoader<T: TargetConnector> {
    target: Arc<T>,
    key_locks: Mutex<HashMap<NaturalKey, Arc<Mutex<()>>>>,
}

impl<T: TargetConnector> TargetLoader<T> {
    pub fn new(target: Arc<T>) -> Self {
        Self {
            target,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    /// Upsert a record without a parent link.
    pub async fn upsert(&self, record: &SourceRecord) -> Result<Upserted> {
        self.upsert_linked(record, None).await
    }

    /// Upsert a record, linking a contact to the target id of its account.
    pub async fn upsert_linked(
        &self,
        record: &SourceRecord,
        account: Option<&TargetId>,
    ) -> Result<Upserted> {
        let key = record.natural_key()?;
        let fields = mapping::transform(record, account);

        let lock = self.key_lock(&key).await;
        let result = {
            let _guard = lock.lock().await;
            self.upsert_locked(record, &key, fields).await
        };
        drop(lock);
        self.release_key_lock(&key).await;
        result
    }

    /// Target records carrying `key`.
    pub async fn lookup(&self, key: &NaturalKey) -> Result<Vec<TargetRecord>> {
        self.target.query(&NaturalKeyFilter::for_key(key)).await
    }

    async fn upsert_locked(
        &self,
        record: &SourceRecord,
        key: &NaturalKey,
        fields: crate::TargetFields,
    ) -> Result<Upserted> {
        let mut matches = self.lookup(key).await?;

        match matches.len() {
            0 => {
                let id = self
                    .target
                    .create(record.object_type(), fields.clone(), Some(record.id()))
                    .await?;
                tracing::debug!("Created {} {id} for {key}", record.object_type());
                Ok(Upserted {
                    record: TargetRecord {
                        id,
                        object_type: record.object_type(),
                        fields,
                        source_id: Some(record.id().clone()),
                    },
                    action: UpsertAction::Created,
                })
            }
            1 => {
                let mut existing = matches.remove(0);
                self.target.update(&existing.id, fields.clone()).await?;
                tracing::debug!(
                    "Updated {} {} for {key}",
                    record.object_type(),
                    existing.id
                );
                existing.fields.extend(fields);
                Ok(Upserted {
                    record: existing,
                    action: UpsertAction::Updated,
                })
            }
            n => {
                tracing::warn!("{n} target records match {key}, skipping");
                Err(SyncError::AmbiguousMatch {
                    key: key.clone(),
                    matches: n,
                })
            }
        }
    }

    async fn key_lock(&self, key: &NaturalKey) -> Arc<Mutex<()>> {
        self.key_locks
            .lock()
            .await
            .entry(key.clone())
            .or_default()
            .clone()
    }

    async fn release_key_lock(&self, key: &NaturalKey) {
        let mut locks = self.key_locks.lock().await;
        // Only the map holds it: nobody else is waiting on this key.
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryTarget;
    use chrono::Utc;
    use serde_json::json;
    use sync_core::{Account, Contact, ObjectType, SourceId};

    fn account(id: &str, name: &str) -> SourceRecord {
        SourceRecord::from(Account::new(name)).with_identity(SourceId::new(id), Utc::now())
    }

    fn contact(id: &str, email: Option<&str>) -> SourceRecord {
        let mut c = Contact::new("Doe").with_first_name("Jane");
        if let Some(email) = email {
            c = c.with_email(email);
        }
        SourceRecord::from(c).with_identity(SourceId::new(id), Utc::now())
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let target = Arc::new(InMemoryTarget::new());
        let loader = TargetLoader::new(target.clone());

        let first = loader.upsert(&account("001A", "Acme")).await.unwrap();
        assert_eq!(first.action, UpsertAction::Created);
        assert_eq!(first.record.source_id, Some(SourceId::new("001A")));

        let second = loader.upsert(&account("001A", "Acme")).await.unwrap();
        assert_eq!(second.action, UpsertAction::Updated);
        assert_eq!(second.record.id, first.record.id);

        assert_eq!(target.count(ObjectType::Account).await, 1);
    }

    #[tokio::test]
    async fn test_update_keeps_unmapped_fields() {
        let target = Arc::new(InMemoryTarget::new());
        let mut fields = crate::TargetFields::new();
        fields.insert("Name".into(), json!("Acme"));
        fields.insert("Territory".into(), json!("EMEA"));
        let id = target.seed(ObjectType::Account, fields).await;

        let loader = TargetLoader::new(target.clone());
        let upserted = loader.upsert(&account("001A", "Acme")).await.unwrap();
        assert_eq!(upserted.action, UpsertAction::Updated);
        assert_eq!(upserted.record.id, id);
        assert_eq!(upserted.record.field_str("Territory"), Some("EMEA"));
    }

    #[tokio::test]
    async fn test_ambiguous_match() {
        let target = Arc::new(InMemoryTarget::new());
        for _ in 0..2 {
            let mut fields = crate::TargetFields::new();
            fields.insert("Email Address".into(), json!("dup@acme.test"));
            target.seed(ObjectType::Contact, fields).await;
        }

        let loader = TargetLoader::new(target.clone());
        let err = loader
            .upsert(&contact("003A", Some("dup@acme.test")))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::AmbiguousMatch { matches: 2, .. }));
        assert!(!err.is_stage_fault());
        assert_eq!(target.count(ObjectType::Contact).await, 2);
    }

    #[tokio::test]
    async fn test_missing_email_is_record_level() {
        let loader = TargetLoader::new(Arc::new(InMemoryTarget::new()));
        let err = loader.upsert(&contact("003A", None)).await.unwrap_err();
        assert!(matches!(err, SyncError::MissingNaturalKey { .. }));
        assert!(!err.is_stage_fault());
    }

    #[tokio::test]
    async fn test_contact_links_to_account() {
        let target = Arc::new(InMemoryTarget::new());
        let loader = TargetLoader::new(target.clone());

        let acc = loader.upsert(&account("001A", "Acme")).await.unwrap();
        let con = loader
            .upsert_linked(&contact("003A", Some("jd@acme.test")), Some(&acc.record.id))
            .await
            .unwrap();
        assert_eq!(
            con.record.field_str("Account Id"),
            Some(acc.record.id.as_str())
        );
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_create_once() {
        let target = Arc::new(InMemoryTarget::new());
        target.set_latency(std::time::Duration::from_millis(5));
        let loader = Arc::new(TargetLoader::new(target.clone()));

        let record = contact("003A", Some("same@acme.test"));
        let results = futures::future::join_all(
            (0..8).map(|_| {
                let loader = loader.clone();
                let record = record.clone();
                async move { loader.upsert(&record).await }
            }),
        )
        .await;

        let created = results
            .iter()
            .filter(|r| matches!(r, Ok(u) if u.action == UpsertAction::Created))
            .count();
        assert_eq!(created, 1);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(target.count(ObjectType::Contact).await, 1);
        assert!(loader.key_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_target_is_stage_fault() {
        let target = Arc::new(InMemoryTarget::new());
        target.set_unreachable(true);
        let loader = TargetLoader::new(target);

        let err = loader.upsert(&account("001A", "Acme")).await.unwrap_err();
        assert!(err.is_stage_fault());
    }
}
