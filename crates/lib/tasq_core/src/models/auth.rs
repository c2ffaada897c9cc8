//! Authentication domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account id named in a verified credential, not yet checked against the account store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerId(pub String);

impl CallerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Stored account (owned by the identity authority; read-only for the core).
#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub username: String,
    /// bcrypt hash.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Verified identity of the caller for the duration of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub account_id: String,
    pub username: String,
}

impl From<&Account> for Principal {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id.clone(),
            username: account.username.clone(),
        }
    }
}

/// JWT claims embedded in bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: account id (standard JWT `sub` claim).
    pub sub: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}
