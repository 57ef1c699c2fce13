//! Record persistence
//!
//! Attachment metadata lives in a host-provided record store; the pipeline
//! only needs keyed lookups.

use std::sync::atomic::{AtomicI64, Ordering};

use af_core::traits::Id;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::AttachmentResult;
use crate::model::AttachmentRecord;

/// Attachment record store trait
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or update a record, assigning an id on first save
    async fn save(&self, record: &mut AttachmentRecord) -> AttachmentResult<Id>;

    /// Get a record by ID
    async fn get(&self, id: Id) -> AttachmentResult<Option<AttachmentRecord>>;

    /// Find the thumbnail of `parent_id` with the given suffix
    async fn find_thumbnail(
        &self,
        parent_id: Id,
        suffix: &str,
    ) -> AttachmentResult<Option<AttachmentRecord>>;

    /// All thumbnails of `parent_id`, in creation order
    async fn thumbnails_of(&self, parent_id: Id) -> AttachmentResult<Vec<AttachmentRecord>>;

    /// Delete a record
    async fn delete(&self, id: Id) -> AttachmentResult<()>;
}

/// In-memory record store for testing
pub struct MemoryRecordStore {
    records: RwLock<Vec<AttachmentRecord>>,
    next_id: AtomicI64,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn save(&self, record: &mut AttachmentRecord) -> AttachmentResult<Id> {
        let id = match record.id {
            Some(id) => id,
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                record.id = Some(id);
                id
            }
        };
        record.touch();

        // staged files belong to the caller's copy only
        let mut stored = record.clone();
        stored.clear_temp_paths();

        let mut records = self.records.write().await;
        match records.iter().position(|r| r.id == Some(id)) {
            Some(pos) => records[pos] = stored,
            None => records.push(stored),
        }

        Ok(id)
    }

    async fn get(&self, id: Id) -> AttachmentResult<Option<AttachmentRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == Some(id)).cloned())
    }

    async fn find_thumbnail(
        &self,
        parent_id: Id,
        suffix: &str,
    ) -> AttachmentResult<Option<AttachmentRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .find(|r| r.parent_id == Some(parent_id) && r.thumbnail.as_deref() == Some(suffix))
            .cloned())
    }

    async fn thumbnails_of(&self, parent_id: Id) -> AttachmentResult<Vec<AttachmentRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: Id) -> AttachmentResult<()> {
        let mut records = self.records.write().await;
        records.retain(|r| r.id != Some(id));
        Ok(())
    }
}
