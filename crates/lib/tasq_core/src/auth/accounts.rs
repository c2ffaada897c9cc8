//! Account storage.
//!
//! The core only reads accounts (to confirm a token's subject still exists);
//! the identity authority writes them on registration.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sqlx::PgPool;

use crate::models::auth::Account;
use crate::store::StoreError;

/// Keyed account lookup.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;

    /// Insert a new account. Returns `false` when the username is already taken.
    async fn insert(&self, account: &Account) -> Result<bool, StoreError>;
}

/// In-memory account store.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    by_id: DashMap<String, Account>,
    /// username → account id
    usernames: DashMap<String, String>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop an account. Tokens naming it stop resolving immediately.
    pub fn remove(&self, id: &str) -> Option<Account> {
        let (_, account) = self.by_id.remove(id)?;
        self.usernames.remove(&account.username);
        Some(account)
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.by_id.get(id).map(|a| a.clone()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let Some(id) = self.usernames.get(username).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.by_id.get(&id).map(|a| a.clone()))
    }

    async fn insert(&self, account: &Account) -> Result<bool, StoreError> {
        // The username entry is the uniqueness point.
        match self.usernames.entry(account.username.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                self.by_id.insert(account.id.clone(), account.clone());
                slot.insert(account.id.clone());
                Ok(true)
            }
        }
    }
}

/// PostgreSQL account store over the `accounts` table.
#[derive(Debug, Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type AccountRow = (String, String, String, DateTime<Utc>);

fn account_from_row((id, username, password_hash, created_at): AccountRow) -> Account {
    Account {
        id,
        username,
        password_hash,
        created_at,
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, username, password_hash, created_at FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(account_from_row))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, username, password_hash, created_at FROM accounts WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(account_from_row))
    }

    async fn insert(&self, account: &Account) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO accounts (id, username, password_hash, created_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (username) DO NOTHING",
        )
        .bind(&account.id)
        .bind(&account.username)
        .bind(&account.password_hash)
        .bind(account.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str, username: &str) -> Account {
        Account {
            id: id.into(),
            username: username.into(),
            password_hash: "hash".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let store = MemoryAccountStore::new();
        assert!(store.insert(&account("a1", "alice")).await.unwrap());
        assert!(!store.insert(&account("a2", "alice")).await.unwrap());
        assert!(store.find_by_id("a2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lookups_by_id_and_username() {
        let store = MemoryAccountStore::new();
        store.insert(&account("a1", "alice")).await.unwrap();
        assert_eq!(store.find_by_id("a1").await.unwrap().unwrap().username, "alice");
        assert_eq!(store.find_by_username("alice").await.unwrap().unwrap().id, "a1");
        assert!(store.find_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn removed_account_is_gone() {
        let store = MemoryAccountStore::new();
        store.insert(&account("a1", "alice")).await.unwrap();
        assert!(store.remove("a1").is_some());
        assert!(store.find_by_id("a1").await.unwrap().is_none());
        assert!(store.find_by_username("alice").await.unwrap().is_none());
    }
}
