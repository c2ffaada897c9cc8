//! PostgreSQL search index over the `task_search` table.
//!
//! The table may live in a different database than the ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::SearchIndex;
use crate::models::task::IndexRecord;
use crate::store::StoreError;

#[derive(Debug, Clone)]
pub struct PgSearchIndex {
    pool: PgPool,
}

impl PgSearchIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type SearchRow = (String, String, String, String, bool, DateTime<Utc>);

const SELECT_SEARCH: &str =
    "SELECT id, owner_id, name, description, completed, created_at FROM task_search";

fn record_from_row((id, owner_id, name, description, completed, created_at): SearchRow) -> IndexRecord {
    IndexRecord {
        id,
        owner_id,
        name,
        description,
        completed,
        created_at,
    }
}

#[async_trait]
impl SearchIndex for PgSearchIndex {
    async fn upsert(&self, record: IndexRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO task_search (id, owner_id, name, name_lower, description, completed, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE SET \
               owner_id = EXCLUDED.owner_id, \
               name = EXCLUDED.name, \
               name_lower = EXCLUDED.name_lower, \
               description = EXCLUDED.description, \
               completed = EXCLUDED.completed, \
               created_at = EXCLUDED.created_at",
        )
        .bind(&record.id)
        .bind(&record.owner_id)
        .bind(&record.name)
        .bind(record.name.to_lowercase())
        .bind(&record.description)
        .bind(record.completed)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM task_search WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<IndexRecord>, StoreError> {
        let row = sqlx::query_as::<_, SearchRow>(&format!("{SELECT_SEARCH} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(record_from_row))
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<IndexRecord>, StoreError> {
        let rows = sqlx::query_as::<_, SearchRow>(&format!(
            "{SELECT_SEARCH} WHERE owner_id = $1 ORDER BY created_at, id"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(record_from_row).collect())
    }

    async fn search_by_name_and_owner(
        &self,
        owner_id: &str,
        fragment: &str,
    ) -> Result<Vec<IndexRecord>, StoreError> {
        // position() instead of LIKE so '%' and '_' in the fragment match literally.
        let rows = sqlx::query_as::<_, SearchRow>(&format!(
            "{SELECT_SEARCH} WHERE owner_id = $1 AND position($2 in name_lower) > 0 \
             ORDER BY created_at, id"
        ))
        .bind(owner_id)
        .bind(fragment.to_lowercase())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(record_from_row).collect())
    }

    async fn list_by_owner_and_completion(
        &self,
        owner_id: &str,
        completed: bool,
    ) -> Result<Vec<IndexRecord>, StoreError> {
        let rows = sqlx::query_as::<_, SearchRow>(&format!(
            "{SELECT_SEARCH} WHERE owner_id = $1 AND completed = $2 ORDER BY created_at, id"
        ))
        .bind(owner_id)
        .bind(completed)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(record_from_row).collect())
    }
}
