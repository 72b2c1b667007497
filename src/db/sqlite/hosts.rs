use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{HostRepo, truncate_to_millis},
    },
    models::{CreateHost, Host},
};

pub struct SqliteHostRepo {
    pool: SqlitePool,
}

impl SqliteHostRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn host_from_row(row: &SqliteRow) -> DbResult<Host> {
        Ok(Host {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            name: row.get("name"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl HostRepo for SqliteHostRepo {
    async fn create(&self, input: CreateHost) -> DbResult<Host> {
        if input.name.trim().is_empty() {
            return Err(DbError::Validation("Host name cannot be empty".into()));
        }

        let id = Uuid::new_v4();
        let now = truncate_to_millis(chrono::Utc::now());

        sqlx::query(
            r#"
            INSERT INTO hosts (id, name, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&input.name)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(format!("Host with name '{}' already exists", input.name))
            }
            _ => DbError::from(e),
        })?;

        Ok(Host {
            id,
            name: input.name,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Host>> {
        let result = sqlx::query(
            r#"
            SELECT id, name, created_at
            FROM hosts
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        result.as_ref().map(Self::host_from_row).transpose()
    }

    async fn get_by_name(&self, name: &str) -> DbResult<Option<Host>> {
        let result = sqlx::query(
            r#"
            SELECT id, name, created_at
            FROM hosts
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        result.as_ref().map(Self::host_from_row).transpose()
    }

    async fn list(&self) -> DbResult<Vec<Host>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, created_at
            FROM hosts
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::host_from_row).collect()
    }
}
