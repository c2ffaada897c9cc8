//! Sync and store tuning.

use std::time::Duration;

/// Default number of index write attempts per mutation.
pub const DEFAULT_INDEX_MAX_ATTEMPTS: u32 = 4;

/// Default first backoff between index write attempts.
pub const DEFAULT_INDEX_BASE_BACKOFF: Duration = Duration::from_millis(50);

/// Default cap on a single backoff.
pub const DEFAULT_INDEX_MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Default bound on any single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pause between reconciliation passes.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of outbox entries examined per reconciliation pass.
pub const DEFAULT_RECONCILE_BATCH: usize = 100;

/// Tuning for the write path and the background reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Index write attempts before a mutation reports pending propagation. At least 1.
    pub index_max_attempts: u32,
    pub index_base_backoff: Duration,
    pub index_max_backoff: Duration,
    /// Bound on every ledger, index and account store call.
    pub store_timeout: Duration,
    pub reconcile_interval: Duration,
    pub reconcile_batch: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            index_max_attempts: DEFAULT_INDEX_MAX_ATTEMPTS,
            index_base_backoff: DEFAULT_INDEX_BASE_BACKOFF,
            index_max_backoff: DEFAULT_INDEX_MAX_BACKOFF,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            reconcile_batch: DEFAULT_RECONCILE_BATCH,
        }
    }
}

impl SyncConfig {
    /// Reads configuration from environment variables, falling back to defaults.
    ///
    /// | Variable                     | Default |
    /// |------------------------------|---------|
    /// | `TASQ_INDEX_MAX_ATTEMPTS`    | `4`     |
    /// | `TASQ_INDEX_BASE_BACKOFF_MS` | `50`    |
    /// | `TASQ_INDEX_MAX_BACKOFF_MS`  | `1000`  |
    /// | `TASQ_STORE_TIMEOUT_MS`      | `5000`  |
    /// | `TASQ_RECONCILE_INTERVAL_MS` | `10000` |
    /// | `TASQ_RECONCILE_BATCH`       | `100`   |
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            index_max_attempts: env_parse("TASQ_INDEX_MAX_ATTEMPTS")
                .unwrap_or(defaults.index_max_attempts)
                .max(1),
            index_base_backoff: env_millis("TASQ_INDEX_BASE_BACKOFF_MS")
                .unwrap_or(defaults.index_base_backoff),
            index_max_backoff: env_millis("TASQ_INDEX_MAX_BACKOFF_MS")
                .unwrap_or(defaults.index_max_backoff),
            store_timeout: env_millis("TASQ_STORE_TIMEOUT_MS").unwrap_or(defaults.store_timeout),
            reconcile_interval: env_millis("TASQ_RECONCILE_INTERVAL_MS")
                .unwrap_or(defaults.reconcile_interval),
            reconcile_batch: env_parse("TASQ_RECONCILE_BATCH")
                .unwrap_or(defaults.reconcile_batch)
                .max(1),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_millis)
}
