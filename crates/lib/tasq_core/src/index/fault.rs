//! A [`SearchIndex`] wrapper that fails on demand.
//!
//! Used by tests and outage drills to exercise degraded propagation and
//! reconciliation without a real broken backend. Faults are injected before
//! the inner call, so a failed write never reaches the wrapped index.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::SearchIndex;
use crate::models::task::IndexRecord;
use crate::store::StoreError;

pub struct FaultInjectingIndex {
    inner: Arc<dyn SearchIndex>,
    fail_writes: AtomicU32,
    offline: AtomicBool,
    delay_ms: AtomicU64,
    writes: AtomicU64,
}

impl FaultInjectingIndex {
    pub fn new(inner: Arc<dyn SearchIndex>) -> Self {
        Self {
            inner,
            fail_writes: AtomicU32::new(0),
            offline: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Fail the next `n` writes (`upsert` or `remove`).
    pub fn fail_next(&self, n: u32) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    /// While offline every call fails, reads included.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay every call, to drive timeouts.
    pub fn set_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Write attempts seen so far, failed ones included.
    pub fn write_attempts(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> Result<(), StoreError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("search index offline".to_string()));
        }
        Ok(())
    }

    async fn gate_write(&self) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        let injected = self
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("injected index write fault".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for FaultInjectingIndex {
    async fn upsert(&self, record: IndexRecord) -> Result<(), StoreError> {
        self.gate_write().await?;
        self.inner.upsert(record).await
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.gate_write().await?;
        self.inner.remove(id).await
    }

    async fn get(&self, id: &str) -> Result<Option<IndexRecord>, StoreError> {
        self.gate().await?;
        self.inner.get(id).await
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<IndexRecord>, StoreError> {
        self.gate().await?;
        self.inner.list_by_owner(owner_id).await
    }

    async fn search_by_name_and_owner(
        &self,
        owner_id: &str,
        fragment: &str,
    ) -> Result<Vec<IndexRecord>, StoreError> {
        self.gate().await?;
        self.inner.search_by_name_and_owner(owner_id, fragment).await
    }

    async fn list_by_owner_and_completion(
        &self,
        owner_id: &str,
        completed: bool,
    ) -> Result<Vec<IndexRecord>, StoreError> {
        self.gate().await?;
        self.inner.list_by_owner_and_completion(owner_id, completed).await
    }
}
