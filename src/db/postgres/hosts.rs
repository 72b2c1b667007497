use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{HostRepo, truncate_to_millis},
    },
    models::{CreateHost, Host},
};

pub struct PostgresHostRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresHostRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn host_from_row(row: &PgRow) -> Host {
        Host {
            id: row.get("id"),
            name: row.get("name"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl HostRepo for PostgresHostRepo {
    async fn create(&self, input: CreateHost) -> DbResult<Host> {
        if input.name.trim().is_empty() {
            return Err(DbError::Validation("Host name cannot be empty".into()));
        }

        let id = Uuid::new_v4();
        let now = truncate_to_millis(chrono::Utc::now());

        sqlx::query(
            r#"
            INSERT INTO hosts (id, name, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(now)
        .execute(&self.write_pool)
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
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.read_pool)
        .await?;

        Ok(result.as_ref().map(Self::host_from_row))
    }

    async fn get_by_name(&self, name: &str) -> DbResult<Option<Host>> {
        let result = sqlx::query(
            r#"
            SELECT id, name, created_at
            FROM hosts
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.read_pool)
        .await?;

        Ok(result.as_ref().map(Self::host_from_row))
    }

    async fn list(&self) -> DbResult<Vec<Host>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, created_at
            FROM hosts
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.read_pool)
        .await?;

        Ok(rows.iter().map(Self::host_from_row).collect())
    }
}
