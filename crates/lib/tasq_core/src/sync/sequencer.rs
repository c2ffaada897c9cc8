//! Per-record sequencing guards.
//!
//! At most one propagation per record id is in flight within a process.
//! Different ids never contend. Slots are created on demand and dropped when
//! the last holder or waiter lets go, so the map is empty when idle.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slots = Arc<DashMap<String, Arc<Mutex<()>>>>;

#[derive(Clone, Default)]
pub struct KeyedLocks {
    slots: Slots,
}

/// Held for the duration of one record's commit-and-propagate.
pub struct KeyGuard {
    key: String,
    slots: Slots,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the guard of `key`.
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        let slot = self.slot(key);
        let guard = slot.lock_owned().await;
        self.wrap(key, guard)
    }

    /// Take the guard of `key` only if nobody holds it.
    pub fn try_acquire(&self, key: &str) -> Option<KeyGuard> {
        let slot = self.slot(key);
        match slot.try_lock_owned() {
            Ok(guard) => Some(self.wrap(key, guard)),
            Err(_) => None,
        }
    }

    /// Number of ids currently held or awaited.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.slots.entry(key.to_string()).or_default().value())
    }

    fn wrap(&self, key: &str, guard: OwnedMutexGuard<()>) -> KeyGuard {
        KeyGuard {
            key: key.to_string(),
            slots: Arc::clone(&self.slots),
            guard: Some(guard),
        }
    }
}

impl KeyGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The map's own reference is the only one left when nobody waits.
        self.slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn map_is_empty_after_release() {
        let locks = KeyedLocks::new();
        {
            let _a = locks.acquire("a").await;
            let _b = locks.acquire("b").await;
            assert_eq!(locks.len(), 2);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn try_acquire_fails_while_held() {
        let locks = KeyedLocks::new();
        let held = locks.acquire("a").await;
        assert!(locks.try_acquire("a").is_none());
        assert!(locks.try_acquire("b").is_some());
        drop(held);
        assert!(locks.try_acquire("a").is_some());
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn same_key_serializes() {
        let locks = KeyedLocks::new();
        let first = locks.acquire("a").await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let guard = locks.acquire("a").await;
                guard.key().to_string()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(first);
        assert_eq!(waiter.await.unwrap(), "a");
        assert!(locks.is_empty());
    }
}
