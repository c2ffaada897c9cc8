//! Keeps the search index consistent with the ledger.
//!
//! A mutation commits to the ledger (which durably queues the index change in
//! its outbox), then projects the change onto the index with bounded retries.
//! If the index stays unreachable the caller still gets the committed value,
//! flagged [`IndexSync::Pending`], and the [`reconcile::Reconciler`] delivers
//! the queued change later.

pub mod reconcile;
pub mod retry;
pub mod sequencer;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::error::ErrorKind;
use crate::index::SearchIndex;
use crate::ledger::{OutboxOp, TaskError, TaskLedger};
use crate::models::task::{Revision, TaskDraft, TaskRecord};
use crate::store::with_timeout;
use crate::uuid::new_id;
use retry::{Projection, RetryPolicy, apply_with_retry};
use sequencer::{KeyGuard, KeyedLocks};

/// The ledger committed but the index write was not confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationFault {
    pub record_id: String,
    pub op: OutboxOp,
    pub attempts: u32,
    pub last_error: String,
}

impl fmt::Display for PropagationFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "index {} of {} unconfirmed after {} attempt(s): {}",
            self.op.as_str(),
            self.record_id,
            self.attempts,
            self.last_error
        )
    }
}

impl std::error::Error for PropagationFault {}

impl PropagationFault {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::PropagationFault
    }
}

/// Whether the index reflects a committed mutation yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSync {
    Converged,
    Pending(PropagationFault),
}

/// A committed ledger result plus the state of its index propagation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synced<T> {
    pub value: T,
    pub index: IndexSync,
}

impl<T> Synced<T> {
    pub fn is_converged(&self) -> bool {
        matches!(self.index, IndexSync::Converged)
    }

    pub fn fault(&self) -> Option<&PropagationFault> {
        match &self.index {
            IndexSync::Pending(fault) => Some(fault),
            IndexSync::Converged => None,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Write path for task mutations.
#[derive(Clone)]
pub struct SyncOrchestrator {
    ledger: TaskLedger,
    index: Arc<dyn SearchIndex>,
    locks: KeyedLocks,
    policy: RetryPolicy,
    timeout: Duration,
}

impl SyncOrchestrator {
    pub fn new(ledger: TaskLedger, index: Arc<dyn SearchIndex>, config: &SyncConfig) -> Self {
        Self {
            ledger,
            index,
            locks: KeyedLocks::new(),
            policy: RetryPolicy::from(config),
            timeout: config.store_timeout,
        }
    }

    pub fn ledger(&self) -> &TaskLedger {
        &self.ledger
    }

    pub fn index(&self) -> &Arc<dyn SearchIndex> {
        &self.index
    }

    pub fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    pub async fn create(
        &self,
        owner_id: &str,
        draft: &TaskDraft,
    ) -> Result<Synced<TaskRecord>, TaskError> {
        let id = new_id();
        let guard = self.locks.acquire(&id).await;
        let record = self.ledger.create_with_id(id, owner_id, draft).await?;
        let index = self.propagate(&guard, Projection::upsert(&record), record.revision).await;
        Ok(Synced { value: record, index })
    }

    /// All drafts commit together; each record then propagates independently.
    pub async fn create_many(
        &self,
        owner_id: &str,
        drafts: &[TaskDraft],
    ) -> Result<Vec<Synced<TaskRecord>>, TaskError> {
        let ids: Vec<String> = drafts.iter().map(|_| new_id()).collect();
        let mut guards = Vec::with_capacity(ids.len());
        for id in &ids {
            guards.push(self.locks.acquire(id).await);
        }
        let records = self.ledger.create_many_with_ids(owner_id, ids, drafts).await?;
        let syncs = join_all(records.iter().zip(&guards).map(|(record, guard)| {
            self.propagate(guard, Projection::upsert(record), record.revision)
        }))
        .await;
        Ok(records
            .into_iter()
            .zip(syncs)
            .map(|(value, index)| Synced { value, index })
            .collect())
    }

    /// Reads the ledger, never the index.
    pub async fn get(&self, id: &str, owner_id: &str) -> Result<Option<TaskRecord>, TaskError> {
        self.ledger.get(id, owner_id).await
    }

    pub async fn update(
        &self,
        id: &str,
        owner_id: &str,
        draft: &TaskDraft,
    ) -> Result<Synced<TaskRecord>, TaskError> {
        let guard = self.locks.acquire(id).await;
        let record = self.ledger.update(id, owner_id, draft).await?;
        let index = self.propagate(&guard, Projection::upsert(&record), record.revision).await;
        Ok(Synced { value: record, index })
    }

    /// Re-completing still projects, which repairs an index left behind by an
    /// earlier degraded call.
    pub async fn complete(&self, id: &str, owner_id: &str) -> Result<Synced<TaskRecord>, TaskError> {
        let guard = self.locks.acquire(id).await;
        let record = self.ledger.complete(id, owner_id).await?;
        let index = self.propagate(&guard, Projection::upsert(&record), record.revision).await;
        Ok(Synced { value: record, index })
    }

    pub async fn delete(&self, id: &str, owner_id: &str) -> Result<Synced<()>, TaskError> {
        let guard = self.locks.acquire(id).await;
        let removed = self.ledger.delete(id, owner_id).await?;
        let index = self
            .propagate(&guard, Projection::Remove(removed.id), removed.revision + 1)
            .await;
        Ok(Synced { value: (), index })
    }

    /// Apply `projection` and acknowledge the outbox through `revision`.
    /// Never fails the caller: the ledger has already committed.
    async fn propagate(&self, guard: &KeyGuard, projection: Projection, revision: Revision) -> IndexSync {
        debug_assert_eq!(guard.key(), projection.record_id());
        match apply_with_retry(self.index.as_ref(), &projection, &self.policy, self.timeout).await {
            Ok(attempts) => {
                debug!(
                    record_id = projection.record_id(),
                    op = projection.op().as_str(),
                    attempts,
                    "index converged"
                );
                self.acknowledge(projection.record_id(), revision).await;
                IndexSync::Converged
            }
            Err(fault) => {
                warn!(
                    kind = %fault.kind(),
                    record_id = %fault.record_id,
                    op = fault.op.as_str(),
                    attempts = fault.attempts,
                    error = %fault.last_error,
                    "index propagation pending; reconciler will retry"
                );
                IndexSync::Pending(fault)
            }
        }
    }

    async fn acknowledge(&self, record_id: &str, revision: Revision) {
        let ack = self.ledger.store().acknowledge(record_id, revision);
        if let Err(e) = with_timeout(self.timeout, ack).await {
            warn!(record_id, revision, error = %e, "outbox acknowledgement failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::fault::FaultInjectingIndex;
    use crate::index::memory::MemorySearchIndex;
    use crate::ledger::LedgerStore;
    use crate::ledger::fault::FaultInjectingLedger;
    use crate::ledger::memory::MemoryLedgerStore;
    use crate::models::task::IndexRecord;

    struct Fixture {
        sync: SyncOrchestrator,
        ledger_store: Arc<MemoryLedgerStore>,
        index: Arc<FaultInjectingIndex>,
        inner: Arc<MemorySearchIndex>,
    }

    fn config() -> SyncConfig {
        SyncConfig {
            index_max_attempts: 3,
            index_base_backoff: Duration::from_millis(1),
            index_max_backoff: Duration::from_millis(2),
            store_timeout: Duration::from_secs(1),
            ..SyncConfig::default()
        }
    }

    fn fixture() -> Fixture {
        let ledger_store = Arc::new(MemoryLedgerStore::new());
        let inner = Arc::new(MemorySearchIndex::new());
        let index = Arc::new(FaultInjectingIndex::new(inner.clone()));
        let config = config();
        let ledger = TaskLedger::new(ledger_store.clone(), config.store_timeout);
        let sync = SyncOrchestrator::new(ledger, index.clone(), &config);
        Fixture {
            sync,
            ledger_store,
            index,
            inner,
        }
    }

    fn draft(name: &str, description: &str) -> TaskDraft {
        TaskDraft::new(name, Some(description)).unwrap()
    }

    #[tokio::test]
    async fn create_converges_and_clears_the_outbox() {
        let fx = fixture();
        let synced = fx.sync.create("u1", &draft("Buy milk", "")).await.unwrap();
        assert!(synced.is_converged());
        assert!(!synced.value.completed);
        assert_eq!(synced.value.owner_id, "u1");

        let listed = fx.inner.list_by_owner("u1").await.unwrap();
        assert_eq!(listed, vec![IndexRecord::from(&synced.value)]);
        assert_eq!(fx.ledger_store.outbox_len(), 0);
        assert!(fx.sync.locks().is_empty());
    }

    #[tokio::test]
    async fn foreign_update_is_not_found_and_leaves_record_alone() {
        let fx = fixture();
        let t1 = fx.sync.create("u1", &draft("a", "")).await.unwrap().value;
        let err = fx
            .sync
            .update(&t1.id, "u2", &draft("b", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::NotFound));
        assert_eq!(fx.sync.get(&t1.id, "u1").await.unwrap(), Some(t1.clone()));
        assert_eq!(fx.inner.get(&t1.id).await.unwrap(), Some(IndexRecord::from(&t1)));
    }

    #[tokio::test]
    async fn second_complete_is_a_no_op_success() {
        let fx = fixture();
        let t = fx.sync.create("u1", &draft("a", "")).await.unwrap().value;
        let first = fx.sync.complete(&t.id, "u1").await.unwrap();
        let second = fx.sync.complete(&t.id, "u1").await.unwrap();
        assert!(second.value.completed);
        assert_eq!(first.value, second.value);
        assert!(second.is_converged());
    }

    #[tokio::test]
    async fn delete_removes_from_ledger_and_index() {
        let fx = fixture();
        let t = fx.sync.create("u1", &draft("a", "")).await.unwrap().value;
        let deleted = fx.sync.delete(&t.id, "u1").await.unwrap();
        assert!(deleted.is_converged());
        assert!(fx.sync.get(&t.id, "u1").await.unwrap().is_none());
        assert!(fx.inner.list_by_owner("u1").await.unwrap().is_empty());
        assert_eq!(fx.ledger_store.outbox_len(), 0);
    }

    #[tokio::test]
    async fn index_outage_still_returns_the_committed_record() {
        let fx = fixture();
        fx.index.set_offline(true);
        let synced = fx.sync.create("u1", &draft("Buy milk", "")).await.unwrap();
        let fault = synced.fault().cloned().unwrap();
        assert_eq!(fault.record_id, synced.value.id);
        assert_eq!(fault.op, OutboxOp::Upsert);
        assert_eq!(fault.attempts, 3);
        assert_eq!(fault.kind(), ErrorKind::PropagationFault);

        assert_eq!(
            fx.sync.get(&synced.value.id, "u1").await.unwrap(),
            Some(synced.value.clone())
        );
        assert!(fx.inner.is_empty());
        assert_eq!(fx.ledger_store.outbox_len(), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_within_the_call() {
        let fx = fixture();
        fx.index.fail_next(2);
        let synced = fx.sync.create("u1", &draft("a", "")).await.unwrap();
        assert!(synced.is_converged());
        assert_eq!(fx.index.write_attempts(), 3);
    }

    #[tokio::test]
    async fn update_then_complete_leaves_index_at_latest_state() {
        let fx = fixture();
        let t = fx.sync.create("u1", &draft("a", "x")).await.unwrap().value;
        fx.sync.update(&t.id, "u1", &draft("b", "y")).await.unwrap();
        let done = fx.sync.complete(&t.id, "u1").await.unwrap().value;

        let indexed = fx.inner.get(&t.id).await.unwrap().unwrap();
        assert!(indexed.completed);
        assert_eq!(indexed.name, "b");
        assert_eq!(indexed.description, "y");
        assert_eq!(indexed, IndexRecord::from(&done));
    }

    #[tokio::test]
    async fn concurrent_mutations_of_one_record_converge_to_the_ledger() {
        let fx = fixture();
        let t = fx.sync.create("u1", &draft("start", "")).await.unwrap().value;
        let mut handles = Vec::new();
        for i in 0..6 {
            let sync = fx.sync.clone();
            let id = t.id.clone();
            handles.push(tokio::spawn(async move {
                sync.update(&id, "u1", &draft(&format!("n{i}"), "")).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_converged());
        }
        let ledger = fx.sync.get(&t.id, "u1").await.unwrap().unwrap();
        let indexed = fx.inner.get(&t.id).await.unwrap().unwrap();
        assert_eq!(indexed, IndexRecord::from(&ledger));
        assert!(fx.sync.locks().is_empty());
    }

    #[tokio::test]
    async fn create_many_propagates_each_record() {
        let fx = fixture();
        let synced = fx
            .sync
            .create_many("u1", &[draft("a", ""), draft("b", ""), draft("c", "")])
            .await
            .unwrap();
        assert_eq!(synced.len(), 3);
        assert!(synced.iter().all(Synced::is_converged));
        assert_eq!(fx.inner.list_by_owner("u1").await.unwrap().len(), 3);
        assert_eq!(fx.ledger_store.pending(10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn rejected_edit_never_touches_the_index() {
        let fx = fixture();
        let t = fx.sync.create("u1", &draft("a", "")).await.unwrap().value;
        fx.sync.complete(&t.id, "u1").await.unwrap();
        let writes = fx.index.write_attempts();
        let err = fx.sync.update(&t.id, "u1", &draft("b", "")).await.unwrap_err();
        assert!(matches!(err, TaskError::AlreadyCompleted));
        assert_eq!(fx.index.write_attempts(), writes);
    }

    #[tokio::test]
    async fn ledger_outage_aborts_the_whole_mutation() {
        let inner_ledger = Arc::new(MemoryLedgerStore::new());
        let ledger_store = Arc::new(FaultInjectingLedger::new(inner_ledger.clone()));
        let index = Arc::new(FaultInjectingIndex::new(Arc::new(MemorySearchIndex::new())));
        let config = config();
        let sync = SyncOrchestrator::new(
            TaskLedger::new(ledger_store.clone(), config.store_timeout),
            index.clone(),
            &config,
        );

        ledger_store.fail_next(1);
        let err = sync.create("u1", &draft("a", "")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert!(inner_ledger.scan(None, 10).await.unwrap().is_empty());
        assert_eq!(inner_ledger.outbox_len(), 0);
        assert_eq!(index.write_attempts(), 0);

        let t = sync.create("u1", &draft("a", "")).await.unwrap().value;
        let writes = index.write_attempts();
        ledger_store.fail_next(1);
        let err = sync.update(&t.id, "u1", &draft("b", "")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert_eq!(sync.get(&t.id, "u1").await.unwrap(), Some(t.clone()));
        assert_eq!(inner_ledger.outbox_len(), 0);
        assert_eq!(index.write_attempts(), writes);
        assert!(sync.locks().is_empty());
    }

    #[tokio::test]
    async fn racing_update_and_delete_leave_no_index_entry() {
        for _ in 0..20 {
            let fx = fixture();
            let t = fx.sync.create("u1", &draft("start", "")).await.unwrap().value;
            let update = tokio::spawn({
                let sync = fx.sync.clone();
                let id = t.id.clone();
                async move { sync.update(&id, "u1", &draft("edited", "")).await }
            });
            let delete = tokio::spawn({
                let sync = fx.sync.clone();
                let id = t.id.clone();
                async move { sync.delete(&id, "u1").await }
            });
            // The update may lose the race and find nothing to edit.
            match update.await.unwrap() {
                Ok(synced) => assert!(synced.is_converged()),
                Err(e) => assert!(matches!(e, TaskError::NotFound)),
            }
            assert!(delete.await.unwrap().unwrap().is_converged());

            assert!(fx.sync.get(&t.id, "u1").await.unwrap().is_none());
            assert!(fx.inner.get(&t.id).await.unwrap().is_none());
            assert_eq!(fx.ledger_store.outbox_len(), 0);
            assert!(fx.sync.locks().is_empty());
        }
    }

    #[test]
    fn fault_display_names_the_record() {
        let fault = PropagationFault {
            record_id: "t1".to_string(),
            op: OutboxOp::Remove,
            attempts: 4,
            last_error: "boom".to_string(),
        };
        assert_eq!(fault.to_string(), "index remove of t1 unconfirmed after 4 attempt(s): boom");
    }
}
