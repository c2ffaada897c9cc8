//! In-memory ledger store.
//!
//! Records and outbox entries live in two `DashMap`s. Each write holds the
//! record's shard entry while it updates the outbox, which gives the same
//! per-record atomicity a single-document database write would.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{LedgerStore, OutboxEntry};
use crate::models::task::{Revision, TaskRecord};
use crate::store::StoreError;

#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    records: DashMap<String, TaskRecord>,
    outbox: DashMap<String, OutboxEntry>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of pending outbox entries.
    pub fn outbox_len(&self) -> usize {
        self.outbox.len()
    }

    fn same_version(stored: &TaskRecord, expected: &TaskRecord) -> bool {
        stored.owner_id == expected.owner_id && stored.revision == expected.revision
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn insert(&self, records: &[TaskRecord]) -> Result<(), StoreError> {
        if let Some(dup) = records.iter().find(|r| self.records.contains_key(&r.id)) {
            return Err(StoreError::Unavailable(format!("duplicate record id {}", dup.id)));
        }
        for record in records {
            if let Entry::Vacant(slot) = self.records.entry(record.id.clone()) {
                self.outbox
                    .insert(record.id.clone(), OutboxEntry::upsert(record));
                slot.insert(record.clone());
            }
        }
        Ok(())
    }

    async fn find_owned(&self, id: &str, owner_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self
            .records
            .get(id)
            .filter(|r| r.is_owned_by(owner_id))
            .map(|r| r.clone()))
    }

    async fn find(&self, id: &str) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.records.get(id).map(|r| r.clone()))
    }

    async fn replace(&self, current: &TaskRecord, next: &TaskRecord) -> Result<bool, StoreError> {
        let Some(mut slot) = self.records.get_mut(&current.id) else {
            return Ok(false);
        };
        if !Self::same_version(&slot, current) {
            return Ok(false);
        }
        self.outbox.insert(next.id.clone(), OutboxEntry::upsert(next));
        *slot = next.clone();
        Ok(true)
    }

    async fn remove(&self, current: &TaskRecord) -> Result<bool, StoreError> {
        let Entry::Occupied(slot) = self.records.entry(current.id.clone()) else {
            return Ok(false);
        };
        if !Self::same_version(slot.get(), current) {
            return Ok(false);
        }
        self.outbox
            .insert(current.id.clone(), OutboxEntry::remove(current));
        slot.remove();
        Ok(true)
    }

    async fn pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        let mut entries: Vec<OutboxEntry> = self.outbox.iter().map(|e| e.clone()).collect();
        entries.sort_by(|a, b| {
            a.enqueued_at
                .cmp(&b.enqueued_at)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        entries.truncate(limit);
        Ok(entries)
    }

    async fn acknowledge(&self, record_id: &str, through: Revision) -> Result<(), StoreError> {
        self.outbox
            .remove_if(record_id, |_, entry| entry.revision <= through);
        Ok(())
    }

    async fn scan(&self, after: Option<&str>, limit: usize) -> Result<Vec<TaskRecord>, StoreError> {
        let mut page: Vec<TaskRecord> = self
            .records
            .iter()
            .filter(|r| after.is_none_or(|cursor| r.id.as_str() > cursor))
            .map(|r| r.clone())
            .collect();
        page.sort_by(|a, b| a.id.cmp(&b.id));
        page.truncate(limit);
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::ledger::OutboxOp;
    use crate::models::task::TaskDraft;

    fn record(id: &str) -> TaskRecord {
        TaskRecord::new(id.into(), "u1", &TaskDraft::new("a", None).unwrap(), Utc::now())
    }

    #[tokio::test]
    async fn stale_replace_loses() {
        let store = MemoryLedgerStore::new();
        let original = record("t1");
        store.insert(std::slice::from_ref(&original)).await.unwrap();
        let first = original.completed();
        assert!(store.replace(&original, &first).await.unwrap());
        // A writer still holding `original` must not overwrite `first`.
        assert!(!store.replace(&original, &original.completed()).await.unwrap());
        assert!(!store.remove(&original).await.unwrap());
        assert_eq!(store.find("t1").await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn duplicate_ids_reject_the_whole_batch() {
        let store = MemoryLedgerStore::new();
        store.insert(&[record("t1")]).await.unwrap();
        assert!(store.insert(&[record("t2"), record("t1")]).await.is_err());
        assert!(store.find("t2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn acknowledge_keeps_newer_entries() {
        let store = MemoryLedgerStore::new();
        let original = record("t1");
        store.insert(std::slice::from_ref(&original)).await.unwrap();
        store.replace(&original, &original.completed()).await.unwrap();
        store.acknowledge("t1", 1).await.unwrap();
        assert_eq!(store.outbox_len(), 1);
        store.acknowledge("t1", 2).await.unwrap();
        assert_eq!(store.outbox_len(), 0);
    }

    #[tokio::test]
    async fn remove_enqueues_tombstone() {
        let store = MemoryLedgerStore::new();
        let original = record("t1");
        store.insert(std::slice::from_ref(&original)).await.unwrap();
        assert!(store.remove(&original).await.unwrap());
        let pending = store.pending(10).await.unwrap();
        assert_eq!(pending[0].op, OutboxOp::Remove);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn scan_pages_in_id_order() {
        let store = MemoryLedgerStore::new();
        store
            .insert(&[record("c"), record("a"), record("b")])
            .await
            .unwrap();
        let first = store.scan(None, 2).await.unwrap();
        assert_eq!(first.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), ["a", "b"]);
        let rest = store.scan(Some("b"), 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, "c");
    }
}
