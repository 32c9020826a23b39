//! Watermark-driven change poller.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use sync_core::{ObjectType, Result, SourceRecord, SyncError};
use watermark::{Watermark, WatermarkStore};

use crate::SourceConnector;

/// Records selected by one poll, in dispatch order (Accounts, then Contacts).
///
/// A batch is consumed exactly once, by [`CandidateBatch::into_records`].
#[derive(Debug)]
pub struct CandidateBatch {
    watermark: Watermark,
    polled_at: DateTime<Utc>,
    records: Vec<SourceRecord>,
}

impl CandidateBatch {
    pub fn new(watermark: Watermark, polled_at: DateTime<Utc>, records: Vec<SourceRecord>) -> Self {
        Self {
            watermark,
            polled_at,
            records,
        }
    }

    /// Watermark the poll selected records after.
    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// When the poll started.
    pub fn polled_at(&self) -> DateTime<Utc> {
        self.polled_at
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count(&self, object_type: ObjectType) -> usize {
        self.records
            .iter()
            .filter(|r| r.object_type() == object_type)
            .count()
    }

    /// Latest modification time among the records, if any.
    pub fn latest_modification(&self) -> Option<DateTime<Utc>> {
        self.records.iter().map(SourceRecord::last_modified).max()
    }

    pub fn records(&self) -> &[SourceRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<SourceRecord> {
        self.records
    }
}

/// Queries the source for records changed since the current watermark.
pub struct ChangePoller<S: SourceConnector> {
    source: Arc<S>,
    watermarks: Arc<WatermarkStore>,
    object_types: Vec<ObjectType>,
}

impl<S: SourceConnector> ChangePoller<S> {
    /// Poller over every supported object type.
    pub fn new(source: Arc<S>, watermarks: Arc<WatermarkStore>) -> Self {
        Self::with_object_types(source, watermarks, ObjectType::ALL.to_vec())
    }

    /// Poller over a subset of object types. They are always queried in
    /// dispatch order, whatever order they are given in.
    pub fn with_object_types(
        source: Arc<S>,
        watermarks: Arc<WatermarkStore>,
        mut object_types: Vec<ObjectType>,
    ) -> Self {
        object_types.sort();
        object_types.dedup();
        Self {
            source,
            watermarks,
            object_types,
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn watermarks(&self) -> &Arc<WatermarkStore> {
        &self.watermarks
    }

    /// Select every record modified after the current watermark.
    ///
    /// Fails with [`SyncError::SourceUnavailable`] if any query fails; no
    /// partial batch is returned in that case.
    pub async fn poll(&self) -> Result<CandidateBatch> {
        let polled_at = Utc::now();
        let watermark = self.watermarks.get().await?;
        let since = watermark.timestamp();

        tracing::debug!(
            "Polling {} for changes since {}",
            self.watermarks.flow(),
            watermark
        );

        let mut records = Vec::new();
        for object_type in &self.object_types {
            let mut changed = self
                .source
                .query(since, *object_type)
                .await
                .map_err(|e| match e {
                    SyncError::SourceUnavailable { .. } => e,
                    other => SyncError::source_unavailable(format!(
                        "{object_type} query failed: {other}"
                    )),
                })?;

            // The boundary is exclusive: anything at the watermark was synced.
            changed.retain(|r| r.object_type() == *object_type && r.last_modified() > since);
            changed.sort_by_key(SourceRecord::last_modified);

            tracing::debug!("Found {} changed {object_type} records", changed.len());
            records.extend(changed);
        }

        if !records.is_empty() {
            tracing::info!(
                "Poll of {} found {} changed records since {}",
                self.watermarks.flow(),
                records.len(),
                watermark
            );
        }

        Ok(CandidateBatch::new(watermark, polled_at, records))
    }
}
