//! Resolves a verified caller id to a live account.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use super::AuthError;
use super::accounts::AccountStore;
use super::jwt::TOKEN_LIFETIME_SECS;
use crate::models::auth::{CallerId, Principal};
use crate::store::with_timeout;

/// Default principal cache TTL: 30 seconds.
pub const DEFAULT_PRINCIPAL_TTL: Duration = Duration::from_secs(30);

/// Inserts between sweeps of expired cache entries.
const SWEEP_EVERY: u64 = 256;

#[derive(Debug, Clone)]
struct CacheEntry {
    principal: Principal,
    expires_at: DateTime<Utc>,
}

/// Short-lived cache of resolved principals keyed by account id.
///
/// The TTL is clamped to the token lifetime, so a cached entry never outlives
/// the credential that produced it.
#[derive(Debug)]
struct PrincipalCache {
    entries: DashMap<String, CacheEntry>,
    ttl: chrono::Duration,
    inserts: AtomicU64,
}

impl PrincipalCache {
    fn new(ttl: Duration) -> Option<Self> {
        let secs = i64::try_from(ttl.as_secs())
            .unwrap_or(TOKEN_LIFETIME_SECS)
            .min(TOKEN_LIFETIME_SECS);
        if secs == 0 {
            return None;
        }
        Some(Self {
            entries: DashMap::new(),
            ttl: chrono::Duration::seconds(secs),
            inserts: AtomicU64::new(0),
        })
    }

    fn get(&self, account_id: &str) -> Option<Principal> {
        let hit = self.entries.get(account_id).and_then(|entry| {
            (Utc::now() < entry.expires_at).then(|| entry.principal.clone())
        });
        if hit.is_none() {
            self.entries.remove(account_id);
        }
        hit
    }

    /// Every [`SWEEP_EVERY`] inserts also drops expired entries, so accounts
    /// that never return do not stay cached.
    fn set(&self, principal: &Principal) {
        let now = Utc::now();
        if (self.inserts.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            self.sweep(now);
        }
        self.entries.insert(
            principal.account_id.clone(),
            CacheEntry {
                principal: principal.clone(),
                expires_at: now + self.ttl,
            },
        );
    }

    fn sweep(&self, now: DateTime<Utc>) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        debug!(evicted = before.saturating_sub(self.entries.len()), "principal cache swept");
    }
}

/// Confirms that the account named by a credential still exists.
pub struct PrincipalResolver {
    accounts: Arc<dyn AccountStore>,
    cache: Option<PrincipalCache>,
    store_timeout: Duration,
}

impl PrincipalResolver {
    /// Resolver without caching: every request does one point lookup.
    pub fn new(accounts: Arc<dyn AccountStore>, store_timeout: Duration) -> Self {
        Self {
            accounts,
            cache: None,
            store_timeout,
        }
    }

    /// Enable the principal cache. A zero TTL leaves it disabled.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = PrincipalCache::new(ttl);
        self
    }

    /// Resolve `caller` to a [`Principal`].
    ///
    /// Unknown accounts are `Unauthenticated`: a token naming a deleted or
    /// nonexistent account is never trusted.
    pub async fn resolve(&self, caller: &CallerId) -> Result<Principal, AuthError> {
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(caller.as_str())) {
            return Ok(cached);
        }

        let account = with_timeout(self.store_timeout, self.accounts.find_by_id(caller.as_str()))
            .await?
            .ok_or_else(|| {
                debug!(account_id = caller.as_str(), "token names unknown account");
                AuthError::Unauthenticated("Unknown account".into())
            })?;

        let principal = Principal::from(&account);
        if let Some(cache) = &self.cache {
            cache.set(&principal);
        }
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::accounts::{AccountStore, MemoryAccountStore};
    use crate::models::auth::Account;

    async fn store_with(id: &str, username: &str) -> Arc<MemoryAccountStore> {
        let store = Arc::new(MemoryAccountStore::new());
        let account = Account {
            id: id.into(),
            username: username.into(),
            password_hash: String::new(),
            created_at: Utc::now(),
        };
        store.insert(&account).await.unwrap();
        store
    }

    #[tokio::test]
    async fn resolves_live_account() {
        let store = store_with("a1", "alice").await;
        let resolver = PrincipalResolver::new(store, Duration::from_secs(1));
        let principal = resolver.resolve(&CallerId("a1".into())).await.unwrap();
        assert_eq!(principal.account_id, "a1");
        assert_eq!(principal.username, "alice");
    }

    #[tokio::test]
    async fn unknown_account_is_unauthenticated() {
        let store = store_with("a1", "alice").await;
        let resolver = PrincipalResolver::new(store, Duration::from_secs(1));
        let err = resolver.resolve(&CallerId("ghost".into())).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn deleted_account_stops_resolving_without_cache() {
        let store = store_with("a1", "alice").await;
        let resolver = PrincipalResolver::new(store.clone(), Duration::from_secs(1));
        resolver.resolve(&CallerId("a1".into())).await.unwrap();
        store.remove("a1");
        assert!(resolver.resolve(&CallerId("a1".into())).await.is_err());
    }

    #[tokio::test]
    async fn cache_serves_repeat_lookups() {
        let store = store_with("a1", "alice").await;
        let resolver = PrincipalResolver::new(store.clone(), Duration::from_secs(1))
            .with_cache_ttl(Duration::from_secs(60));
        resolver.resolve(&CallerId("a1".into())).await.unwrap();
        store.remove("a1");
        // Within the TTL the cached principal is still served.
        assert!(resolver.resolve(&CallerId("a1".into())).await.is_ok());
    }

    #[test]
    fn expired_entries_are_swept_on_insert() {
        let cache = PrincipalCache::new(Duration::from_secs(60)).unwrap();
        let principal = |id: &str| Principal {
            account_id: id.to_string(),
            username: id.to_string(),
        };
        cache.entries.insert(
            "gone".into(),
            CacheEntry {
                principal: principal("gone"),
                expires_at: Utc::now() - chrono::Duration::seconds(1),
            },
        );
        for i in 0..SWEEP_EVERY {
            cache.set(&principal(&format!("a{}", i % 4)));
        }
        assert!(!cache.entries.contains_key("gone"));
        assert_eq!(cache.entries.len(), 4);
    }

    #[test]
    fn zero_ttl_disables_cache() {
        assert!(PrincipalCache::new(Duration::ZERO).is_none());
        let cache = PrincipalCache::new(Duration::from_secs(u64::MAX)).unwrap();
        assert_eq!(cache.ttl, chrono::Duration::seconds(TOKEN_LIFETIME_SECS));
    }
}
