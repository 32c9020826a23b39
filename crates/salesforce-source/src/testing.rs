//! In-memory source connector for tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use sync_core::{ObjectType, Result, SourceId, SourceRecord, SyncError};
use tokio::sync::Mutex;

use crate::{CreatedRecord, SourceConnector};

#[derive(Default)]
struct State {
    records: Vec<SourceRecord>,
    next_id: u64,
    clock: Option<DateTime<Utc>>,
}

impl State {
    /// Next modification time. Strictly increasing so every write is
    /// distinguishable from the previous one by the poller.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.clock {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.clock = Some(next);
        next
    }

    fn assign_id(&mut self, object_type: ObjectType) -> SourceId {
        self.next_id += 1;
        let prefix = match object_type {
            ObjectType::Account => "001",
            ObjectType::Contact => "003",
        };
        SourceId::new(format!("{prefix}{:015}", self.next_id))
    }
}

/// Source CRM held in process memory.
///
/// Ids look like Salesforce ids (`001...` for Accounts, `003...` for
/// Contacts). [`InMemorySource::set_unavailable`] makes every operation fail
/// with [`SyncError::SourceUnavailable`] until it is cleared.
#[derive(Default)]
pub struct InMemorySource {
    state: Mutex<State>,
    unavailable: AtomicBool,
    queries: AtomicUsize,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `query` calls served so far, including failed ones.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Replace an existing record, stamping a new modification time.
    pub async fn update(&self, record: SourceRecord) -> Result<DateTime<Utc>> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let ts = state.tick();
        let id = record.id().clone();
        let slot = state
            .records
            .iter_mut()
            .find(|r| r.id() == &id)
            .ok_or_else(|| SyncError::source_unavailable(format!("No record with id {id}")))?;
        *slot = record.with_identity(id, ts);
        Ok(ts)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SyncError::source_unavailable(
                "in-memory source is marked unavailable",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceConnector for InMemorySource {
    async fn query(
        &self,
        since: DateTime<Utc>,
        object_type: ObjectType,
    ) -> Result<Vec<SourceRecord>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .records
            .iter()
            .filter(|r| r.object_type() == object_type && r.last_modified() > since)
            .cloned()
            .collect())
    }

    async fn create(&self, record: SourceRecord) -> Result<CreatedRecord> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let id = state.assign_id(record.object_type());
        let last_modified = state.tick();
        state
            .records
            .push(record.with_identity(id.clone(), last_modified));
        Ok(CreatedRecord { id, last_modified })
    }

    async fn get(&self, object_type: ObjectType, id: &SourceId) -> Result<Option<SourceRecord>> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .records
            .iter()
            .find(|r| r.object_type() == object_type && r.id() == id)
            .cloned())
    }

    async fn delete(&self, ids: &[SourceId]) -> Result<()> {
        self.check_available()?;
        self.state
            .lock()
            .await
            .records
            .retain(|r| !ids.contains(r.id()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_core::{Account, Contact};

    #[tokio::test]
    async fn test_ids_and_timestamps() {
        let source = InMemorySource::new();
        let a = source.create(Account::new("Acme").into()).await.unwrap();
        let c = source
            .create(Contact::new("Doe").with_email("jd@acme.test").into())
            .await
            .unwrap();

        assert!(a.id.as_str().starts_with("001"));
        assert!(c.id.as_str().starts_with("003"));
        assert_eq!(a.id.as_str().len(), 18);
        assert!(c.last_modified > a.last_modified);

        let fetched = source.get(ObjectType::Account, &a.id).await.unwrap().unwrap();
        assert_eq!(fetched.last_modified(), a.last_modified);
        assert!(source.get(ObjectType::Contact, &a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_restamps() {
        let source = InMemorySource::new();
        let a = source.create(Account::new("Acme").into()).await.unwrap();

        let mut record = source.get(ObjectType::Account, &a.id).await.unwrap().unwrap();
        if let SourceRecord::Account(account) = &mut record {
            account.number_of_employees = Some(42);
        }
        let ts = source.update(record).await.unwrap();
        assert!(ts > a.last_modified);

        let changed = source.query(a.last_modified, ObjectType::Account).await.unwrap();
        assert_eq!(changed.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_and_delete() {
        let source = InMemorySource::new();
        let a = source.create(Account::new("Acme").into()).await.unwrap();

        source.set_unavailable(true);
        assert!(source
            .query(DateTime::<Utc>::default(), ObjectType::Account)
            .await
            .unwrap_err()
            .is_cycle_fault());
        assert_eq!(source.query_count(), 1);

        source.set_unavailable(false);
        source.delete(&[a.id]).await.unwrap();
        assert!(source.is_empty().await);
    }
}
