//! Bounded retry of index writes with exponential backoff.

use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use super::PropagationFault;
use crate::config::SyncConfig;
use crate::index::SearchIndex;
use crate::ledger::OutboxOp;
use crate::models::task::{IndexRecord, TaskRecord};
use crate::store::{StoreError, with_timeout};

/// The index write a ledger change calls for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Upsert(IndexRecord),
    Remove(String),
}

impl Projection {
    pub fn upsert(record: &TaskRecord) -> Self {
        Projection::Upsert(IndexRecord::from(record))
    }

    pub fn record_id(&self) -> &str {
        match self {
            Projection::Upsert(record) => &record.id,
            Projection::Remove(id) => id,
        }
    }

    pub fn op(&self) -> OutboxOp {
        match self {
            Projection::Upsert(_) => OutboxOp::Upsert,
            Projection::Remove(_) => OutboxOp::Remove,
        }
    }

    async fn apply(&self, index: &dyn SearchIndex) -> Result<(), StoreError> {
        match self {
            Projection::Upsert(record) => index.upsert(record.clone()).await,
            Projection::Remove(id) => index.remove(id).await,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Pause after the failed attempt numbered `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl From<&SyncConfig> for RetryPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_attempts: config.index_max_attempts.max(1),
            base_backoff: config.index_base_backoff,
            max_backoff: config.index_max_backoff,
        }
    }
}

/// Apply `projection`, retrying failures. Returns the attempts used.
pub async fn apply_with_retry(
    index: &dyn SearchIndex,
    projection: &Projection,
    policy: &RetryPolicy,
    timeout: Duration,
) -> Result<u32, PropagationFault> {
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();
    for attempt in 0..max_attempts {
        match with_timeout(timeout, projection.apply(index)).await {
            Ok(()) => return Ok(attempt + 1),
            Err(e) => {
                debug!(
                    record_id = projection.record_id(),
                    attempt = attempt + 1,
                    error = %e,
                    "index write failed"
                );
                last_error = e.to_string();
            }
        }
        if attempt + 1 < max_attempts {
            sleep(policy.backoff(attempt)).await;
        }
    }
    Err(PropagationFault {
        record_id: projection.record_id().to_string(),
        op: projection.op(),
        attempts: max_attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::fault::FaultInjectingIndex;
    use crate::index::memory::MemorySearchIndex;
    use chrono::Utc;
    use std::sync::Arc;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    fn projection() -> Projection {
        Projection::Upsert(IndexRecord {
            id: "t1".to_string(),
            owner_id: "u1".to_string(),
            name: "a".to_string(),
            description: String::new(),
            completed: false,
            created_at: Utc::now(),
        })
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(300),
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(50));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(300));
        assert_eq!(policy.backoff(40), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn recovers_from_transient_failures() {
        let index = FaultInjectingIndex::new(Arc::new(MemorySearchIndex::new()));
        index.fail_next(2);
        let attempts = apply_with_retry(&index, &projection(), &policy(4), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn gives_up_with_a_fault_after_max_attempts() {
        let index = FaultInjectingIndex::new(Arc::new(MemorySearchIndex::new()));
        index.set_offline(true);
        let fault = apply_with_retry(&index, &projection(), &policy(3), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(fault.record_id, "t1");
        assert_eq!(fault.op, OutboxOp::Upsert);
        assert_eq!(fault.attempts, 3);
        assert_eq!(index.write_attempts(), 3);
        assert!(fault.last_error.contains("offline"));
    }

    #[tokio::test]
    async fn slow_writes_count_as_failures() {
        let index = FaultInjectingIndex::new(Arc::new(MemorySearchIndex::new()));
        index.set_delay(Duration::from_millis(200));
        let fault = apply_with_retry(&index, &projection(), &policy(2), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(fault.last_error.contains("timed out"));
    }
}
