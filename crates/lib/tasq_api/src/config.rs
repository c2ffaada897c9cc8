//! API server configuration.

use std::time::Duration;

use tasq_core::auth::jwt::resolve_jwt_secret;
use tasq_core::auth::principal::DEFAULT_PRINCIPAL_TTL;
use tasq_core::config::SyncConfig;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL for accounts and the ledger.
    pub database_url: String,
    /// Separate database for the search index. Defaults to `database_url`.
    pub index_database_url: Option<String>,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// How long a resolved principal is trusted without a lookup. Zero disables caching.
    pub principal_cache_ttl: Duration,
    pub sync: SyncConfig,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                          | Default                           |
    /// |-----------------------------------|-----------------------------------|
    /// | `BIND_ADDR`                       | `127.0.0.1:3100`                  |
    /// | `DATABASE_URL`                    | `postgres://localhost:5432/tasq`  |
    /// | `INDEX_DATABASE_URL`              | unset (same as `DATABASE_URL`)    |
    /// | `TASQ_JWT_SECRET` / `JWT_SECRET`  | generated & persisted to file     |
    /// | `TASQ_PRINCIPAL_CACHE_TTL_SECS`   | `30`                              |
    ///
    /// Sync tuning comes from [`SyncConfig::from_env`].
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/tasq".into()),
            index_database_url: std::env::var("INDEX_DATABASE_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            jwt_secret: resolve_jwt_secret(),
            principal_cache_ttl: std::env::var("TASQ_PRINCIPAL_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_PRINCIPAL_TTL),
            sync: SyncConfig::from_env(),
        }
    }

    /// A configuration for tests and local tooling with a fixed secret.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".into(),
            database_url: String::new(),
            index_database_url: None,
            jwt_secret: jwt_secret.into(),
            principal_cache_ttl: Duration::ZERO,
            sync: SyncConfig::default(),
        }
    }
}
