use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{CreateFact, Fact, FactQuery, FactStamp},
};

#[async_trait]
pub trait FactRepo: Send + Sync {
    /// Record a new fact scan. Fails with `NotFound` if the host does not exist.
    async fn create(&self, input: CreateFact) -> DbResult<Fact>;

    /// Get a fact scan by ID
    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Fact>>;

    /// List fact scans newest first, with optional host/module filters
    async fn list(&self, query: FactQuery) -> DbResult<Vec<Fact>>;

    /// Count fact scans matching the query (ignores `limit`)
    async fn count(&self, query: FactQuery) -> DbResult<i64>;

    // ==================== Retention Operations ====================

    /// Load every fact stamped at or before `cutoff`, optionally restricted to
    /// one module.
    ///
    /// Results are ordered by host, then module, then timestamp descending, so
    /// each (host, module) group is contiguous and newest first.
    async fn list_cleanup_candidates(
        &self,
        cutoff: DateTime<Utc>,
        module: Option<&str>,
    ) -> DbResult<Vec<FactStamp>>;

    /// Count facts stamped at or before `cutoff`.
    async fn count_through(&self, cutoff: DateTime<Utc>, module: Option<&str>) -> DbResult<u64>;

    /// Delete every fact stamped at or before `cutoff`.
    ///
    /// Deletes in batches to avoid locking the database.
    /// Returns the total number of records deleted.
    async fn delete_through(
        &self,
        cutoff: DateTime<Utc>,
        module: Option<&str>,
        batch_size: u32,
    ) -> DbResult<u64>;

    /// Delete the given facts by identity, `batch_size` IDs per statement.
    ///
    /// IDs that no longer exist are skipped; the return value counts rows
    /// actually removed.
    async fn delete_by_ids(&self, ids: &[Uuid], batch_size: u32) -> DbResult<u64>;
}
