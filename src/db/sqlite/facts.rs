use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::{parse_uuid, placeholders};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{FactRepo, effective_batch_size, truncate_to_millis, validate_fact_timestamp},
    },
    models::{CreateFact, Fact, FactQuery, FactStamp},
};

/// SQLite's default limit on bound parameters per statement.
const MAX_BOUND_PARAMETERS: usize = 32_766;

pub struct SqliteFactRepo {
    pool: SqlitePool,
}

impl SqliteFactRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn fact_from_row(row: &SqliteRow) -> DbResult<Fact> {
        let facts_str: String = row.get("facts");

        Ok(Fact {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            host_id: parse_uuid(&row.get::<String, _>("host_id"))?,
            module: row.get("module"),
            timestamp: row.get("timestamp"),
            facts: serde_json::from_str(&facts_str)?,
        })
    }

    /// Build the WHERE clause shared by `list` and `count`.
    fn query_filters(query: &FactQuery) -> (String, Vec<String>) {
        let mut conditions = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(host_id) = &query.host_id {
            conditions.push("host_id = ?");
            params.push(host_id.to_string());
        }
        if let Some(module) = &query.module {
            conditions.push("module = ?");
            params.push(module.clone());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Cutoff condition for retention queries. The cutoff is inclusive.
    fn cutoff_filter(module: Option<&str>) -> &'static str {
        match module {
            Some(_) => "timestamp <= ? AND module = ?",
            None => "timestamp <= ?",
        }
    }
}

#[async_trait]
impl FactRepo for SqliteFactRepo {
    async fn create(&self, input: CreateFact) -> DbResult<Fact> {
        if input.module.is_empty() {
            return Err(DbError::Validation("Fact module cannot be empty".into()));
        }

        let id = Uuid::new_v4();
        let timestamp = truncate_to_millis(input.timestamp);
        validate_fact_timestamp(timestamp)?;
        let facts_json = serde_json::to_string(&input.facts)?;

        sqlx::query(
            r#"
            INSERT INTO facts (id, host_id, module, timestamp, facts)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(input.host_id.to_string())
        .bind(&input.module)
        .bind(timestamp)
        .bind(&facts_json)
        .execute(&self.pool)
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
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        result.as_ref().map(Self::fact_from_row).transpose()
    }

    async fn list(&self, query: FactQuery) -> DbResult<Vec<Fact>> {
        let (where_clause, params) = Self::query_filters(&query);
        let limit_clause = if query.limit.is_some() {
            "LIMIT ?"
        } else {
            ""
        };

        let sql = format!(
            r#"
            SELECT id, host_id, module, timestamp, facts
            FROM facts
            {}
            ORDER BY timestamp DESC, id DESC
            {}
            "#,
            where_clause, limit_clause
        );

        let mut query_builder = sqlx::query(&sql);
        for param in &params {
            query_builder = query_builder.bind(param);
        }
        if let Some(limit) = query.limit {
            query_builder = query_builder.bind(limit);
        }

        let rows = query_builder.fetch_all(&self.pool).await?;
        rows.iter().map(Self::fact_from_row).collect()
    }

    async fn count(&self, query: FactQuery) -> DbResult<i64> {
        let (where_clause, params) = Self::query_filters(&query);
        let sql = format!("SELECT COUNT(*) as count FROM facts {}", where_clause);

        let mut query_builder = sqlx::query(&sql);
        for param in &params {
            query_builder = query_builder.bind(param);
        }

        let row = query_builder.fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>("count"))
    }

    // ==================== Retention Operations ====================

    async fn list_cleanup_candidates(
        &self,
        cutoff: DateTime<Utc>,
        module: Option<&str>,
    ) -> DbResult<Vec<FactStamp>> {
        let sql = format!(
            r#"
            SELECT id, host_id, module, timestamp
            FROM facts
            WHERE {}
            ORDER BY host_id, module, timestamp DESC, id DESC
            "#,
            Self::cutoff_filter(module)
        );

        let mut query_builder = sqlx::query(&sql).bind(cutoff);
        if let Some(module) = module {
            query_builder = query_builder.bind(module);
        }

        let rows = query_builder.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(FactStamp {
                    id: parse_uuid(&row.get::<String, _>("id"))?,
                    host_id: parse_uuid(&row.get::<String, _>("host_id"))?,
                    module: row.get("module"),
                    timestamp: row.get("timestamp"),
                })
            })
            .collect()
    }

    async fn count_through(&self, cutoff: DateTime<Utc>, module: Option<&str>) -> DbResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) as count FROM facts WHERE {}",
            Self::cutoff_filter(module)
        );

        let mut query_builder = sqlx::query(&sql).bind(cutoff);
        if let Some(module) = module {
            query_builder = query_builder.bind(module);
        }

        let row = query_builder.fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>("count") as u64)
    }

    async fn delete_through(
        &self,
        cutoff: DateTime<Utc>,
        module: Option<&str>,
        batch_size: u32,
    ) -> DbResult<u64> {
        let limit = effective_batch_size(batch_size) as i64;
        let sql = format!(
            r#"
            DELETE FROM facts
            WHERE id IN (
                SELECT id FROM facts
                WHERE {}
                LIMIT ?
            )
            "#,
            Self::cutoff_filter(module)
        );

        let mut total_deleted: u64 = 0;

        loop {
            let mut query_builder = sqlx::query(&sql).bind(cutoff);
            if let Some(module) = module {
                query_builder = query_builder.bind(module);
            }

            let rows_deleted = query_builder
                .bind(limit)
                .execute(&self.pool)
                .await?
                .rows_affected();
            total_deleted += rows_deleted;

            if rows_deleted < limit as u64 {
                break;
            }
        }

        Ok(total_deleted)
    }

    async fn delete_by_ids(&self, ids: &[Uuid], batch_size: u32) -> DbResult<u64> {
        let mut total_deleted: u64 = 0;

        let chunk_size = effective_batch_size(batch_size).min(MAX_BOUND_PARAMETERS);

        for chunk in ids.chunks(chunk_size) {
            let sql = format!(
                "DELETE FROM facts WHERE id IN ({})",
                placeholders(chunk.len())
            );

            let mut query_builder = sqlx::query(&sql);
            for id in chunk {
                query_builder = query_builder.bind(id.to_string());
            }

            total_deleted += query_builder.execute(&self.pool).await?.rows_affected();
        }

        Ok(total_deleted)
    }
}
