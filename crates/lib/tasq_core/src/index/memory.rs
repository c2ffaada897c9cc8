//! In-memory search index.
//!
//! Records live in one map keyed by id; a secondary map from owner to ids
//! keeps owner-scoped reads from scanning everyone's records.

use std::collections::BTreeSet;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{SearchIndex, sort_records};
use crate::models::task::IndexRecord;
use crate::store::StoreError;

#[derive(Debug, Clone)]
struct Entry {
    record: IndexRecord,
    name_lower: String,
}

#[derive(Debug, Default)]
pub struct MemorySearchIndex {
    records: DashMap<String, Entry>,
    by_owner: DashMap<String, BTreeSet<String>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn unlink(&self, owner_id: &str, id: &str) {
        if let Some(mut ids) = self.by_owner.get_mut(owner_id) {
            ids.remove(id);
        }
        self.by_owner.remove_if(owner_id, |_, ids| ids.is_empty());
    }

    fn collect<F>(&self, owner_id: &str, keep: F) -> Vec<IndexRecord>
    where
        F: Fn(&Entry) -> bool,
    {
        let ids: Vec<String> = self
            .by_owner
            .get(owner_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        let mut out: Vec<IndexRecord> = ids
            .iter()
            .filter_map(|id| self.records.get(id))
            .filter(|entry| entry.record.owner_id == owner_id && keep(entry))
            .map(|entry| entry.record.clone())
            .collect();
        sort_records(&mut out);
        out
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn upsert(&self, record: IndexRecord) -> Result<(), StoreError> {
        let id = record.id.clone();
        let owner_id = record.owner_id.clone();
        let entry = Entry {
            name_lower: record.name.to_lowercase(),
            record,
        };
        let previous = self.records.insert(id.clone(), entry);
        if let Some(previous) = previous
            && previous.record.owner_id != owner_id
        {
            self.unlink(&previous.record.owner_id, &id);
        }
        self.by_owner.entry(owner_id).or_default().insert(id);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        if let Some((_, entry)) = self.records.remove(id) {
            self.unlink(&entry.record.owner_id, id);
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<IndexRecord>, StoreError> {
        Ok(self.records.get(id).map(|entry| entry.record.clone()))
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<IndexRecord>, StoreError> {
        Ok(self.collect(owner_id, |_| true))
    }

    async fn search_by_name_and_owner(
        &self,
        owner_id: &str,
        fragment: &str,
    ) -> Result<Vec<IndexRecord>, StoreError> {
        let needle = fragment.to_lowercase();
        Ok(self.collect(owner_id, |entry| entry.name_lower.contains(&needle)))
    }

    async fn list_by_owner_and_completion(
        &self,
        owner_id: &str,
        completed: bool,
    ) -> Result<Vec<IndexRecord>, StoreError> {
        Ok(self.collect(owner_id, |entry| entry.record.completed == completed))
    }
}
