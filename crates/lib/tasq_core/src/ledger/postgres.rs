//! PostgreSQL ledger store over the `tasks` and `task_outbox` tables.
//!
//! Each write runs in a transaction together with its outbox upsert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use super::{LedgerStore, OutboxEntry, OutboxOp};
use crate::models::task::{Revision, TaskRecord};
use crate::store::StoreError;

#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type TaskRow = (String, String, String, String, bool, DateTime<Utc>, i64);

const TASK_COLUMNS: &str = "id, owner_id, name, description, completed, created_at, revision";

fn record_from_row(
    (id, owner_id, name, description, completed, created_at, revision): TaskRow,
) -> TaskRecord {
    TaskRecord {
        id,
        owner_id,
        name,
        description,
        completed,
        created_at,
        revision,
    }
}

/// Coalescing outbox write: a newer entry for the same record replaces the old one.
async fn enqueue(tx: &mut Transaction<'_, Postgres>, entry: &OutboxEntry) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO task_outbox (record_id, op, revision, enqueued_at) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (record_id) DO UPDATE SET \
           op = EXCLUDED.op, \
           revision = EXCLUDED.revision, \
           enqueued_at = EXCLUDED.enqueued_at",
    )
    .bind(&entry.record_id)
    .bind(entry.op.as_str())
    .bind(entry.revision)
    .bind(entry.enqueued_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn insert(&self, records: &[TaskRecord]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                "INSERT INTO tasks (id, owner_id, name, description, completed, created_at, revision) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(&record.id)
            .bind(&record.owner_id)
            .bind(&record.name)
            .bind(&record.description)
            .bind(record.completed)
            .bind(record.created_at)
            .bind(record.revision)
            .execute(&mut *tx)
            .await?;
            enqueue(&mut tx, &OutboxEntry::upsert(record)).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_owned(&self, id: &str, owner_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND owner_id = $2"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(record_from_row))
    }

    async fn find(&self, id: &str) -> Result<Option<TaskRecord>, StoreError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(record_from_row))
    }

    async fn replace(&self, current: &TaskRecord, next: &TaskRecord) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE tasks SET name = $4, description = $5, completed = $6, revision = $7 \
             WHERE id = $1 AND owner_id = $2 AND revision = $3",
        )
        .bind(&current.id)
        .bind(&current.owner_id)
        .bind(current.revision)
        .bind(&next.name)
        .bind(&next.description)
        .bind(next.completed)
        .bind(next.revision)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }
        enqueue(&mut tx, &OutboxEntry::upsert(next)).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn remove(&self, current: &TaskRecord) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query(
            "DELETE FROM tasks WHERE id = $1 AND owner_id = $2 AND revision = $3",
        )
        .bind(&current.id)
        .bind(&current.owner_id)
        .bind(current.revision)
        .execute(&mut *tx)
        .await?;
        if deleted.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }
        enqueue(&mut tx, &OutboxEntry::remove(current)).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, i64, DateTime<Utc>)>(
            "SELECT record_id, op, revision, enqueued_at FROM task_outbox \
             ORDER BY enqueued_at, record_id LIMIT $1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(record_id, op, revision, enqueued_at)| {
                let op = OutboxOp::parse(&op).ok_or_else(|| {
                    StoreError::Unavailable(format!("unknown outbox op '{op}' for {record_id}"))
                })?;
                Ok(OutboxEntry {
                    record_id,
                    op,
                    revision,
                    enqueued_at,
                })
            })
            .collect()
    }

    async fn acknowledge(&self, record_id: &str, through: Revision) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM task_outbox WHERE record_id = $1 AND revision <= $2")
            .bind(record_id)
            .bind(through)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn scan(&self, after: Option<&str>, limit: usize) -> Result<Vec<TaskRecord>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE ($1::text IS NULL OR id > $1) \
             ORDER BY id LIMIT $2"
        ))
        .bind(after)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(record_from_row).collect())
    }
}
