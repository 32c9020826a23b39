//! Source connector trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sync_core::{ObjectType, Result, SourceId, SourceRecord};

/// Identity the source system assigned to a newly created record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRecord {
    pub id: SourceId,
    pub last_modified: DateTime<Utc>,
}

/// Operations the sync engine performs against the source CRM.
///
/// Implementations report transport problems as
/// [`sync_core::SyncError::SourceUnavailable`]; the poller maps any other
/// error from `query` to that variant as well.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Records of `object_type` modified strictly after `since`.
    async fn query(&self, since: DateTime<Utc>, object_type: ObjectType)
        -> Result<Vec<SourceRecord>>;

    /// Create a record and return the id and modification time assigned to it.
    async fn create(&self, record: SourceRecord) -> Result<CreatedRecord>;

    /// Fetch a single record by id.
    async fn get(&self, object_type: ObjectType, id: &SourceId) -> Result<Option<SourceRecord>>;

    /// Delete records by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[SourceId]) -> Result<()>;
}
