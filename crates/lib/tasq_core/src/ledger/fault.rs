//! A [`LedgerStore`] wrapper that fails on demand.
//!
//! Faults are injected before the inner call, so a failed write never
//! reaches the wrapped store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;

use super::{LedgerStore, OutboxEntry};
use crate::models::task::{Revision, TaskRecord};
use crate::store::StoreError;

pub struct FaultInjectingLedger {
    inner: Arc<dyn LedgerStore>,
    fail_writes: AtomicU32,
    offline: AtomicBool,
}

impl FaultInjectingLedger {
    pub fn new(inner: Arc<dyn LedgerStore>) -> Self {
        Self {
            inner,
            fail_writes: AtomicU32::new(0),
            offline: AtomicBool::new(false),
        }
    }

    /// Fail the next `n` record writes (`insert`, `replace` or `remove`).
    pub fn fail_next(&self, n: u32) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    /// While offline every call fails, reads included.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn gate(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("ledger offline".to_string()));
        }
        Ok(())
    }

    fn gate_write(&self) -> Result<(), StoreError> {
        self.gate()?;
        let injected = self
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("injected ledger write fault".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for FaultInjectingLedger {
    async fn insert(&self, records: &[TaskRecord]) -> Result<(), StoreError> {
        self.gate_write()?;
        self.inner.insert(records).await
    }

    async fn find_owned(&self, id: &str, owner_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        self.gate()?;
        self.inner.find_owned(id, owner_id).await
    }

    async fn find(&self, id: &str) -> Result<Option<TaskRecord>, StoreError> {
        self.gate()?;
        self.inner.find(id).await
    }

    async fn replace(&self, current: &TaskRecord, next: &TaskRecord) -> Result<bool, StoreError> {
        self.gate_write()?;
        self.inner.replace(current, next).await
    }

    async fn remove(&self, current: &TaskRecord) -> Result<bool, StoreError> {
        self.gate_write()?;
        self.inner.remove(current).await
    }

    async fn pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        self.gate()?;
        self.inner.pending(limit).await
    }

    async fn acknowledge(&self, record_id: &str, through: Revision) -> Result<(), StoreError> {
        self.gate()?;
        self.inner.acknowledge(record_id, through).await
    }

    async fn scan(&self, after: Option<&str>, limit: usize) -> Result<Vec<TaskRecord>, StoreError> {
        self.gate()?;
        self.inner.scan(after, limit).await
    }
}
