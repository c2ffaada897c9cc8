//! The search mirror: a denormalized, owner-scoped projection of the ledger
//! serving list and search reads.
//!
//! The index is never authoritative. Writes reach it only through the sync
//! layer, and a record missing here is repaired by reconciliation.

pub mod fault;
pub mod memory;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::ledger::TaskError;
use crate::models::task::IndexRecord;
use crate::store::{StoreError, with_timeout};

/// Storage for [`IndexRecord`]s.
///
/// `upsert` overwrites and `remove` of an absent id succeeds, so applying the
/// same projection twice leaves the same state as applying it once. Every
/// listing is ordered by `created_at`, then `id`.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn upsert(&self, record: IndexRecord) -> Result<(), StoreError>;

    async fn remove(&self, id: &str) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<IndexRecord>, StoreError>;

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<IndexRecord>, StoreError>;

    /// Case-insensitive substring match on `name`.
    async fn search_by_name_and_owner(
        &self,
        owner_id: &str,
        fragment: &str,
    ) -> Result<Vec<IndexRecord>, StoreError>;

    async fn list_by_owner_and_completion(
        &self,
        owner_id: &str,
        completed: bool,
    ) -> Result<Vec<IndexRecord>, StoreError>;
}

/// Sort key shared by every implementation.
pub(crate) fn sort_records(records: &mut [IndexRecord]) {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// Read-side facade over a [`SearchIndex`], bounding each call by the store timeout.
#[derive(Clone)]
pub struct TaskSearch {
    index: Arc<dyn SearchIndex>,
    timeout: Duration,
}

impl TaskSearch {
    pub fn new(index: Arc<dyn SearchIndex>, timeout: Duration) -> Self {
        Self { index, timeout }
    }

    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<IndexRecord>, TaskError> {
        Ok(with_timeout(self.timeout, self.index.list_by_owner(owner_id)).await?)
    }

    pub async fn search_by_name_and_owner(
        &self,
        owner_id: &str,
        fragment: &str,
    ) -> Result<Vec<IndexRecord>, TaskError> {
        Ok(with_timeout(
            self.timeout,
            self.index.search_by_name_and_owner(owner_id, fragment),
        )
        .await?)
    }

    pub async fn list_by_owner_and_completion(
        &self,
        owner_id: &str,
        completed: bool,
    ) -> Result<Vec<IndexRecord>, TaskError> {
        Ok(with_timeout(
            self.timeout,
            self.index.list_by_owner_and_completion(owner_id, completed),
        )
        .await?)
    }
}
