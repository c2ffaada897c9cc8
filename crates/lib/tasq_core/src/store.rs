//! Backing-store plumbing shared by the ledger, the index and the account store.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Failure of a backing store call.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

/// Bound a store call by `timeout`.
///
/// Store calls never hang: an elapsed deadline surfaces as
/// [`StoreError::Timeout`], which callers treat as retryable.
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(timeout)),
    }
}
