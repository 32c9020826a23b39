//! TargetConnector trait definition.

use async_trait::async_trait;
use std::collections::BTreeMap;
use sync_core::{NaturalKey, ObjectType, Result, SourceId, TargetId, TargetRecord};

use crate::mapping;

/// Field values keyed by Siebel field name.
pub type TargetFields = BTreeMap<String, serde_json::Value>;

/// Equality filter on a single target field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaturalKeyFilter {
    pub object_type: ObjectType,
    pub field: String,
    pub value: String,
}

impl NaturalKeyFilter {
    /// Filter selecting target records that carry `key`.
    pub fn for_key(key: &NaturalKey) -> Self {
        Self {
            object_type: key.object_type(),
            field: mapping::natural_key_field(key.object_type()).to_string(),
            value: key.value().to_string(),
        }
    }

    pub fn matches(&self, record: &TargetRecord) -> bool {
        record.object_type == self.object_type
            && record.field_str(&self.field) == Some(self.value.as_str())
    }
}

/// Operations the loader performs against the target CRM.
///
/// Transport failures must be reported as
/// [`sync_core::SyncError::TargetUnavailable`] so the batch job treats them
/// as stage faults rather than per-record failures.
#[async_trait]
pub trait TargetConnector: Send + Sync {
    /// Records matching `filter`.
    async fn query(&self, filter: &NaturalKeyFilter) -> Result<Vec<TargetRecord>>;

    /// Create a record and return its target id.
    async fn create(
        &self,
        object_type: ObjectType,
        fields: TargetFields,
        source_id: Option<&SourceId>,
    ) -> Result<TargetId>;

    /// Overwrite the given fields of an existing record. Fields not present
    /// in `fields` keep their current value.
    async fn update(&self, id: &TargetId, fields: TargetFields) -> Result<()>;

    /// Delete records by id. Unknown ids are ignored.
    async fn delete(&self, object_type: ObjectType, ids: &[TargetId]) -> Result<()>;
}
