//! In-memory target connector for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use sync_core::{ObjectType, Result, SourceId, SyncError, TargetId, TargetRecord};
use tokio::sync::Mutex;

use crate::{NaturalKeyFilter, TargetConnector, TargetFields};

/// One call the connector served, in the order it was served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOperation {
    Query {
        object_type: ObjectType,
        value: String,
    },
    Create {
        object_type: ObjectType,
        id: TargetId,
    },
    Update {
        id: TargetId,
    },
    Delete {
        object_type: ObjectType,
        ids: Vec<TargetId>,
    },
}

impl TargetOperation {
    pub fn object_type(&self) -> Option<ObjectType> {
        match self {
            TargetOperation::Query { object_type, .. }
            | TargetOperation::Create { object_type, .. }
            | TargetOperation::Delete { object_type, .. } => Some(*object_type),
            TargetOperation::Update { .. } => None,
        }
    }
}

#[derive(Default)]
struct State {
    records: Vec<TargetRecord>,
    next_id: u64,
    log: Vec<TargetOperation>,
}

impl State {
    fn assign_id(&mut self) -> TargetId {
        self.next_id += 1;
        TargetId::new(format!("1-{:06X}", self.next_id))
    }
}

/// Target CRM held in process memory.
///
/// Fault injection:
/// - [`InMemoryTarget::set_unreachable`] fails every call with
///   [`SyncError::TargetUnavailable`]
/// - [`InMemoryTarget::set_hang`] makes every call wait forever
/// - [`InMemoryTarget::set_latency`] delays every call
#[derive(Default)]
pub struct InMemoryTarget {
    state: Mutex<State>,
    unreachable: AtomicBool,
    hang: AtomicBool,
    latency_ms: AtomicU64,
}

impl InMemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Insert a record directly, bypassing the operation log.
    pub async fn seed(&self, object_type: ObjectType, fields: TargetFields) -> TargetId {
        let mut state = self.state.lock().await;
        let id = state.assign_id();
        state.records.push(TargetRecord {
            id: id.clone(),
            object_type,
            fields,
            source_id: None,
        });
        id
    }

    pub async fn records(&self, object_type: ObjectType) -> Vec<TargetRecord> {
        self.state
            .lock()
            .await
            .records
            .iter()
            .filter(|r| r.object_type == object_type)
            .cloned()
            .collect()
    }

    pub async fn count(&self, object_type: ObjectType) -> usize {
        self.records(object_type).await.len()
    }

    pub async fn get(&self, id: &TargetId) -> Option<TargetRecord> {
        self.state
            .lock()
            .await
            .records
            .iter()
            .find(|r| &r.id == id)
            .cloned()
    }

    pub async fn operations(&self) -> Vec<TargetOperation> {
        self.state.lock().await.log.clone()
    }

    async fn enter(&self) -> Result<()> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SyncError::target_unavailable(
                "in-memory target is marked unreachable",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl TargetConnector for InMemoryTarget {
    async fn query(&self, filter: &NaturalKeyFilter) -> Result<Vec<TargetRecord>> {
        self.enter().await?;
        let mut state = self.state.lock().await;
        state.log.push(TargetOperation::Query {
            object_type: filter.object_type,
            value: filter.value.clone(),
        });
        Ok(state
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        object_type: ObjectType,
        fields: TargetFields,
        source_id: Option<&SourceId>,
    ) -> Result<TargetId> {
        self.enter().await?;
        let mut state = self.state.lock().await;
        let id = state.assign_id();
        state.records.push(TargetRecord {
            id: id.clone(),
            object_type,
            fields,
            source_id: source_id.cloned(),
        });
        state.log.push(TargetOperation::Create {
            object_type,
            id: id.clone(),
        });
        Ok(id)
    }

    async fn update(&self, id: &TargetId, fields: TargetFields) -> Result<()> {
        self.enter().await?;
        let mut state = self.state.lock().await;
        let record = state
            .records
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| SyncError::target_unavailable(format!("No target record {id}")))?;
        record.fields.extend(fields);
        state.log.push(TargetOperation::Update { id: id.clone() });
        Ok(())
    }

    async fn delete(&self, object_type: ObjectType, ids: &[TargetId]) -> Result<()> {
        self.enter().await?;
        let mut state = self.state.lock().await;
        state
            .records
            .retain(|r| !(r.object_type == object_type && ids.contains(&r.id)));
        state.log.push(TargetOperation::Delete {
            object_type,
            ids: ids.to_vec(),
        });
        Ok(())
    }
}
