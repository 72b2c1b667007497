use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{FactRepo, effective_batch_size, truncate_to_millis, validate_fact_timestamp},
    },
    models::{CreateFact, Fact, FactQuery, FactStamp},
};

pub struct PostgresFactRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresFactRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn fact_from_row(row: &PgRow) -> Fact {
        Fact {
            id: row.get("id"),
            host_id: row.get("host_id"),
            module: row.get("module"),
            timestamp: row.get("timestamp"),
            facts: row.get("facts"),
        }
    }
}

#[async_trait]
impl FactRepo for PostgresFactRepo {
    async fn create(&self, input: CreateFact) -> DbResult<Fact> {
        if input.module.is_empty() {
            return Err(DbError::Validation("Fact module cannot be empty".into()));
        }

        let id = Uuid::new_v4();
        let timestamp = truncate_to_millis(input.timestamp);
        validate_fact_timestamp(timestamp)?;

        sqlx::query(
            r#"
            INSERT INTO facts (id, host_id, module, timestamp, facts)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(input.host_id)
        .bind(&input.module)
        .bind(timestamp)
        .bind(&input.facts)
        .execute(&self.write_pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                DbError::NotFound
            }
            _ => DbError::from(e),
        })?;

        Ok(Fact {
            id,
            host_id: input.host_id,
            module: input.module,
            timestamp,
            facts: input.facts,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Fact>> {
        let result = sqlx::query(
            r#"
            SELECT id, host_id, module, timestamp, facts
            FROM facts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.read_pool)
        .await?;

        Ok(result.as_ref().map(Self::fact_from_row))
    }

    async fn list(&self, query: FactQuery) -> DbResult<Vec<Fact>> {
        // NULL parameters disable their filter, which keeps the statement static
        let rows = sqlx::query(
            r#"
            SELECT id, host_id, module, timestamp, facts
            FROM facts
            WHERE ($1::uuid IS NULL OR host_id = $1)
              AND ($2::text IS NULL OR module = $2)
            ORDER BY timestamp DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(query.host_id)
        .bind(query.module.as_deref())
        .bind(query.limit)
        .fetch_all(&self.read_pool)
        .await?;

        Ok(rows.iter().map(Self::fact_from_row).collect())
    }

    async fn count(&self, query: FactQuery) -> DbResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM facts
            WHERE ($1::uuid IS NULL OR host_id = $1)
              AND ($2::text IS NULL OR module = $2)
            "#,
        )
        .bind(query.host_id)
        .bind(query.module.as_deref())
        .fetch_one(&self.read_pool)
        .await?;

        Ok(row.get::<i64, _>("count"))
    }

    // ==================== Retention Operations ====================

    async fn list_cleanup_candidates(
        &self,
        cutoff: DateTime<Utc>,
        module: Option<&str>,
    ) -> DbResult<Vec<FactStamp>> {
        // Read from the primary: the deletes that follow must see the same rows
        let rows = sqlx::query(
            r#"
            SELECT id, host_id, module, timestamp
            FROM facts
            WHERE timestamp <= $1
              AND ($2::text IS NULL OR module = $2)
            ORDER BY host_id, module, timestamp DESC, id DESC
            "#,
        )
        .bind(cutoff)
        .bind(module)
        .fetch_all(&self.write_pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| FactStamp {
                id: row.get("id"),
                host_id: row.get("host_id"),
                module: row.get("module"),
                timestamp: row.get("timestamp"),
            })
            .collect())
    }

    async fn count_through(&self, cutoff: DateTime<Utc>, module: Option<&str>) -> DbResult<u64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM facts
            WHERE timestamp <= $1
              AND ($2::text IS NULL OR module = $2)
            "#,
        )
        .bind(cutoff)
        .bind(module)
        .fetch_one(&self.write_pool)
        .await?;

        Ok(row.get::<i64, _>("count") as u64)
    }

    async fn delete_through(
        &self,
        cutoff: DateTime<Utc>,
        module: Option<&str>,
        batch_size: u32,
    ) -> DbResult<u64> {
        let limit = effective_batch_size(batch_size) as i64;
        let mut total_deleted: u64 = 0;

        loop {
            // PostgreSQL efficient batched deletion using ctid
            let result = sqlx::query(
                r#"
                DELETE FROM facts
                WHERE ctid IN (
                    SELECT ctid FROM facts
                    WHERE timestamp <= $1
                      AND ($2::text IS NULL OR module = $2)
                    LIMIT $3
                )
                "#,
            )
            .bind(cutoff)
            .bind(module)
            .bind(limit)
            .execute(&self.write_pool)
            .await?;

            let rows_deleted = result.rows_affected();
            total_deleted += rows_deleted;

            if rows_deleted < limit as u64 {
                break;
            }
        }

        Ok(total_deleted)
    }

    async fn delete_by_ids(&self, ids: &[Uuid], batch_size: u32) -> DbResult<u64> {
        let mut total_deleted: u64 = 0;

        for chunk in ids.chunks(effective_batch_size(batch_size)) {
            let result = sqlx::query("DELETE FROM facts WHERE id = ANY($1)")
                .bind(chunk)
                .execute(&self.write_pool)
                .await?;
            total_deleted += result.rows_affected();
        }

        Ok(total_deleted)
    }
}
