//! Background convergence of the search index with the ledger.
//!
//! The reconciler drains the ledger outbox. For every pending entry it reads
//! the record's current ledger state and makes the index match, then
//! acknowledges the entry. Applying the current state rather than the queued
//! change makes a pass idempotent and immune to reordering.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::SyncOrchestrator;
use super::sequencer::KeyedLocks;
use crate::config::SyncConfig;
use crate::index::SearchIndex;
use crate::ledger::{LedgerStore, OutboxEntry};
use crate::models::task::{IndexRecord, Revision};
use crate::store::{StoreError, with_timeout};

/// Records read per page while rebuilding.
const REBUILD_PAGE: usize = 500;

/// Index writes per record before a pass gives up on a record that keeps moving.
const MAX_SETTLE_PASSES: usize = 4;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub examined: usize,
    pub converged: usize,
    /// Entries whose record a request was propagating at the time.
    pub skipped: usize,
    pub failed: usize,
}

pub struct Reconciler {
    ledger: Arc<dyn LedgerStore>,
    index: Arc<dyn SearchIndex>,
    locks: KeyedLocks,
    timeout: Duration,
    interval: Duration,
    batch: usize,
}

impl Reconciler {
    /// Shares the orchestrator's stores and sequencing guards.
    pub fn new(sync: &SyncOrchestrator, config: &SyncConfig) -> Self {
        Self {
            ledger: Arc::clone(sync.ledger().store()),
            index: Arc::clone(sync.index()),
            locks: sync.locks().clone(),
            timeout: config.store_timeout,
            interval: config.reconcile_interval,
            batch: config.reconcile_batch.max(1),
        }
    }

    /// One pass over the oldest pending outbox entries.
    pub async fn run_once(&self) -> Result<ReconcileReport, StoreError> {
        let entries = with_timeout(self.timeout, self.ledger.pending(self.batch)).await?;
        let mut report = ReconcileReport {
            examined: entries.len(),
            ..ReconcileReport::default()
        };
        for entry in entries {
            let Some(_guard) = self.locks.try_acquire(&entry.record_id) else {
                report.skipped += 1;
                continue;
            };
            match self.converge(&entry).await {
                Ok(()) => report.converged += 1,
                Err(e) => {
                    warn!(record_id = %entry.record_id, error = %e, "reconcile failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn converge(&self, entry: &OutboxEntry) -> Result<(), StoreError> {
        let id = entry.record_id.as_str();
        let through = match self.project_current(id).await? {
            Some(revision) => revision.max(entry.revision),
            None => entry.revision,
        };
        with_timeout(self.timeout, self.ledger.acknowledge(id, through)).await
    }

    /// Make the index match the record's ledger state.
    ///
    /// After writing, the ledger is read again: a writer in another process
    /// may have committed and propagated in between, and the write just made
    /// must not outlive it. Returns the revision the index now reflects, or
    /// `None` when the record is gone.
    async fn project_current(&self, id: &str) -> Result<Option<Revision>, StoreError> {
        let mut current = with_timeout(self.timeout, self.ledger.find(id)).await?;
        for _ in 0..MAX_SETTLE_PASSES {
            let indexed = with_timeout(self.timeout, self.index.get(id)).await?;
            let wrote = match &current {
                Some(record) => {
                    let wanted = IndexRecord::from(record);
                    let stale = indexed.as_ref() != Some(&wanted);
                    if stale {
                        with_timeout(self.timeout, self.index.upsert(wanted)).await?;
                        debug!(record_id = id, revision = record.revision, "index repaired");
                    }
                    stale
                }
                None => {
                    let stale = indexed.is_some();
                    if stale {
                        with_timeout(self.timeout, self.index.remove(id)).await?;
                        debug!(record_id = id, "stale index entry removed");
                    }
                    stale
                }
            };
            let revision = current.as_ref().map(|r| r.revision);
            if !wrote {
                return Ok(revision);
            }
            let after = with_timeout(self.timeout, self.ledger.find(id)).await?;
            if after.as_ref().map(|r| r.revision) == revision {
                return Ok(revision);
            }
            current = after;
        }
        Err(StoreError::Unavailable(format!(
            "record {id} kept changing during reconciliation"
        )))
    }

    /// Project every ledger record onto the index, holding each record's
    /// sequencing guard. Returns the count of records written or confirmed.
    pub async fn rebuild(&self) -> Result<usize, StoreError> {
        let mut after: Option<String> = None;
        let mut written = 0;
        loop {
            let page =
                with_timeout(self.timeout, self.ledger.scan(after.as_deref(), REBUILD_PAGE)).await?;
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.id.clone());
            for record in &page {
                let _guard = self.locks.acquire(&record.id).await;
                if self.project_current(&record.id).await?.is_some() {
                    written += 1;
                }
            }
            if page.len() < REBUILD_PAGE {
                break;
            }
        }
        info!(records = written, "search index rebuilt from ledger");
        Ok(written)
    }

    /// Run passes every `reconcile_interval` until `cancel` fires.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
                match self.run_once().await {
                    Ok(report) if report.examined > 0 => info!(
                        examined = report.examined,
                        converged = report.converged,
                        skipped = report.skipped,
                        failed = report.failed,
                        "reconcile pass"
                    ),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "reconcile pass aborted"),
                }
            }
            debug!("reconciler stopped");
        })
    }
}
