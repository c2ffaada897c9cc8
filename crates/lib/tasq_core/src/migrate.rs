//! Database migration support.
//!
//! Embeds and runs SQL migrations from `tasq_core/migrations/`. The same set
//! is applied to the ledger database and, when it is a separate database, to
//! the index database.

use sqlx::PgPool;

/// Run all embedded database migrations against the given pool.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
