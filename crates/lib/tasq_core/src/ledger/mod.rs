//! The task ledger: authoritative store for task records.
//!
//! Every ledger write also records an [`OutboxEntry`] in the same atomic
//! store operation. The outbox is what makes index propagation recoverable:
//! whatever happens after the ledger commits, the pending propagation is
//! durable and the reconciler will eventually deliver it.

pub mod fault;
pub mod memory;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ErrorKind;
use crate::models::task::{Revision, TaskDraft, TaskRecord};
use crate::store::{StoreError, with_timeout};
use crate::uuid::new_id;

/// Compare-and-set retries before a contended mutation gives up.
pub const MAX_CAS_ATTEMPTS: u32 = 8;

/// Task operation errors.
///
/// An index write that fails after the ledger commits is not an error of the
/// operation; it is reported as [`crate::sync::IndexSync::Pending`].
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task not found")]
    NotFound,

    #[error("Cannot update a completed task")]
    AlreadyCompleted,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::NotFound => ErrorKind::NotFound,
            TaskError::AlreadyCompleted => ErrorKind::AlreadyCompleted,
            TaskError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
        }
    }
}

impl From<StoreError> for TaskError {
    fn from(e: StoreError) -> Self {
        TaskError::StoreUnavailable(e.to_string())
    }
}

/// Index operation an outbox entry asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxOp {
    Upsert,
    Remove,
}

impl OutboxOp {
    pub fn as_str(self) -> &'static str {
        match self {
            OutboxOp::Upsert => "upsert",
            OutboxOp::Remove => "remove",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "upsert" => Some(OutboxOp::Upsert),
            "remove" => Some(OutboxOp::Remove),
            _ => None,
        }
    }
}

/// A pending index propagation, keyed by record id.
///
/// A newer write for the same record replaces the older entry. Delivery
/// always projects the record's *current* ledger state, so nothing is lost by
/// coalescing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub record_id: String,
    pub op: OutboxOp,
    /// Ledger revision this entry was written for. `Remove` entries carry the
    /// deleted record's revision plus one.
    pub revision: Revision,
    pub enqueued_at: DateTime<Utc>,
}

impl OutboxEntry {
    pub fn upsert(record: &TaskRecord) -> Self {
        Self {
            record_id: record.id.clone(),
            op: OutboxOp::Upsert,
            revision: record.revision,
            enqueued_at: Utc::now(),
        }
    }

    pub fn remove(record: &TaskRecord) -> Self {
        Self {
            record_id: record.id.clone(),
            op: OutboxOp::Remove,
            revision: record.revision + 1,
            enqueued_at: Utc::now(),
        }
    }
}

/// Durable keyed storage for task records and their outbox.
///
/// Implementations must make each write and its outbox entry atomic, and the
/// conditional writes must compare on `(id, owner_id, revision)`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert records and an `Upsert` outbox entry for each, all or nothing.
    async fn insert(&self, records: &[TaskRecord]) -> Result<(), StoreError>;

    /// Ownership-scoped point lookup.
    async fn find_owned(&self, id: &str, owner_id: &str) -> Result<Option<TaskRecord>, StoreError>;

    /// Unscoped point lookup, for reconciliation only.
    async fn find(&self, id: &str) -> Result<Option<TaskRecord>, StoreError>;

    /// Replace `current` with `next` if the stored revision still equals
    /// `current.revision`. Returns `false` on a lost race.
    async fn replace(&self, current: &TaskRecord, next: &TaskRecord) -> Result<bool, StoreError>;

    /// Delete `current` if its stored revision is unchanged. Returns `false` on a lost race.
    async fn remove(&self, current: &TaskRecord) -> Result<bool, StoreError>;

    /// Oldest pending outbox entries first.
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError>;

    /// Drop the outbox entry for `record_id` if its revision is at most `through`.
    async fn acknowledge(&self, record_id: &str, through: Revision) -> Result<(), StoreError>;

    /// Page through all records ordered by id, starting after `after`.
    async fn scan(&self, after: Option<&str>, limit: usize) -> Result<Vec<TaskRecord>, StoreError>;
}

/// Ownership-scoped task operations over a [`LedgerStore`].
///
/// Each operation reads, decides and writes with compare-and-set, so
/// concurrent mutations of one record serialize at the store without a
/// global lock.
#[derive(Clone)]
pub struct TaskLedger {
    store: Arc<dyn LedgerStore>,
    timeout: Duration,
}

impl TaskLedger {
    pub fn new(store: Arc<dyn LedgerStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub async fn create(&self, owner_id: &str, draft: &TaskDraft) -> Result<TaskRecord, TaskError> {
        self.create_with_id(new_id(), owner_id, draft).await
    }

    /// Create under a caller-chosen id, so the caller can hold the id's
    /// sequencing guard before the record becomes visible.
    pub async fn create_with_id(
        &self,
        id: String,
        owner_id: &str,
        draft: &TaskDraft,
    ) -> Result<TaskRecord, TaskError> {
        let record = TaskRecord::new(id, owner_id, draft, Utc::now());
        with_timeout(self.timeout, self.store.insert(std::slice::from_ref(&record))).await?;
        debug!(record_id = %record.id, owner_id, "task created");
        Ok(record)
    }

    /// Create a batch in one atomic store write.
    pub async fn create_many(
        &self,
        owner_id: &str,
        drafts: &[TaskDraft],
    ) -> Result<Vec<TaskRecord>, TaskError> {
        let ids = drafts.iter().map(|_| new_id()).collect();
        self.create_many_with_ids(owner_id, ids, drafts).await
    }

    /// Batch variant of [`TaskLedger::create_with_id`]. `ids` pairs with `drafts` by position.
    pub async fn create_many_with_ids(
        &self,
        owner_id: &str,
        ids: Vec<String>,
        drafts: &[TaskDraft],
    ) -> Result<Vec<TaskRecord>, TaskError> {
        debug_assert_eq!(ids.len(), drafts.len());
        if drafts.is_empty() {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let records: Vec<TaskRecord> = ids
            .into_iter()
            .zip(drafts)
            .map(|(id, draft)| TaskRecord::new(id, owner_id, draft, now))
            .collect();
        with_timeout(self.timeout, self.store.insert(&records)).await?;
        debug!(owner_id, count = records.len(), "task batch created");
        Ok(records)
    }

    /// Ownership mismatch is indistinguishable from absence.
    pub async fn get(&self, id: &str, owner_id: &str) -> Result<Option<TaskRecord>, TaskError> {
        Ok(with_timeout(self.timeout, self.store.find_owned(id, owner_id)).await?)
    }

    pub async fn update(
        &self,
        id: &str,
        owner_id: &str,
        draft: &TaskDraft,
    ) -> Result<TaskRecord, TaskError> {
        self.transition(id, owner_id, |current| {
            if current.completed {
                return Err(TaskError::AlreadyCompleted);
            }
            Ok(Some(current.edited(draft)))
        })
        .await
    }

    /// Completing a completed record succeeds without writing.
    pub async fn complete(&self, id: &str, owner_id: &str) -> Result<TaskRecord, TaskError> {
        self.transition(id, owner_id, |current| {
            Ok((!current.completed).then(|| current.completed()))
        })
        .await
    }

    /// Returns the record as it was when removed.
    pub async fn delete(&self, id: &str, owner_id: &str) -> Result<TaskRecord, TaskError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.load_owned(id, owner_id).await?;
            if with_timeout(self.timeout, self.store.remove(&current)).await? {
                debug!(record_id = id, owner_id, "task deleted");
                return Ok(current);
            }
        }
        Err(contended(id))
    }

    /// Read, decide, compare-and-set. `decide` returns `None` for a no-op.
    async fn transition<F>(&self, id: &str, owner_id: &str, decide: F) -> Result<TaskRecord, TaskError>
    where
        F: Fn(&TaskRecord) -> Result<Option<TaskRecord>, TaskError>,
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.load_owned(id, owner_id).await?;
            let Some(next) = decide(&current)? else {
                return Ok(current);
            };
            if with_timeout(self.timeout, self.store.replace(&current, &next)).await? {
                debug!(record_id = id, revision = next.revision, "task updated");
                return Ok(next);
            }
        }
        Err(contended(id))
    }

    async fn load_owned(&self, id: &str, owner_id: &str) -> Result<TaskRecord, TaskError> {
        self.get(id, owner_id).await?.ok_or(TaskError::NotFound)
    }
}

fn contended(id: &str) -> TaskError {
    warn!(record_id = id, attempts = MAX_CAS_ATTEMPTS, "gave up on contended record");
    TaskError::StoreUnavailable(format!(
        "record contended after {MAX_CAS_ATTEMPTS} attempts"
    ))
}
