//! Fact cleanup: the bucket planner bound to a fact store.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{RelativeDuration, sweeper::plan_sweep};
use crate::{
    config::CleanupConfig,
    db::{DbResult, FactRepo, earliest_storable, latest_storable},
    observability::metrics,
};

/// Label used for deletion metrics when a sweep spans every module.
const ALL_MODULES: &str = "all";

/// Something that can run a relative-cutoff sweep.
///
/// Implemented by [`FactCleanup`]; the command layer depends on this trait so
/// it can be exercised without a database.
#[async_trait]
pub trait CleanupRunner: Send + Sync {
    /// Sweep facts older than `now - older_than`. Returns the number deleted,
    /// or the number that would be deleted in dry-run mode.
    async fn run(
        &self,
        older_than: &RelativeDuration,
        granularity: &RelativeDuration,
        module: Option<&str>,
    ) -> DbResult<u64>;

    fn is_dry_run(&self) -> bool;
}

/// Down-sampling retention sweep over recorded facts.
pub struct FactCleanup {
    facts: Arc<dyn FactRepo>,
    dry_run: bool,
    batch_size: u32,
}

impl FactCleanup {
    pub fn new(facts: Arc<dyn FactRepo>, config: &CleanupConfig) -> Self {
        Self {
            facts,
            dry_run: config.dry_run,
            batch_size: config.batch_size,
        }
    }

    /// Force dry-run mode on, e.g. from a command-line flag.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run |= dry_run;
        self
    }

    /// Delete facts stamped at or before `older_than`, keeping the newest fact
    /// per (host, module) in each `granularity`-wide bucket.
    ///
    /// Returns the number of facts deleted, or that would be deleted when
    /// running dry.
    pub async fn cleanup(
        &self,
        older_than: DateTime<Utc>,
        granularity: &RelativeDuration,
        module: Option<&str>,
    ) -> DbResult<u64> {
        let dry_run_msg = if self.dry_run { " (DRY RUN)" } else { "" };

        if older_than < earliest_storable() {
            tracing::debug!(cutoff = %older_than, "Cutoff predates every stored fact");
            return Ok(0);
        }

        // Buckets stay anchored at `older_than`; only the store query is clamped
        let store_cutoff = older_than.min(latest_storable());

        if granularity.is_zero() {
            return self.purge(store_cutoff, module).await;
        }

        let candidates = self
            .facts
            .list_cleanup_candidates(store_cutoff, module)
            .await?;
        let candidate_count = candidates.len();
        let plan = plan_sweep(candidates, older_than, granularity);

        tracing::debug!(
            cutoff = %older_than,
            granularity = %granularity,
            module = module.unwrap_or(ALL_MODULES),
            candidates = candidate_count,
            groups = plan.groups,
            kept = plan.kept,
            to_delete = plan.delete_count(),
            "Planned fact sweep{}",
            dry_run_msg
        );

        if self.dry_run || plan.is_empty() {
            return Ok(plan.delete_count());
        }

        // Rows already removed by a concurrent sweep are not counted
        let mut deleted = 0;
        for (module, ids) in &plan.delete {
            let removed = self.facts.delete_by_ids(ids, self.batch_size).await?;
            if removed > 0 {
                metrics::record_fact_deletion(module, removed);
            }
            deleted += removed;
        }

        Ok(deleted)
    }

    /// Zero granularity: every candidate goes.
    async fn purge(&self, older_than: DateTime<Utc>, module: Option<&str>) -> DbResult<u64> {
        if self.dry_run {
            let count = self.facts.count_through(older_than, module).await?;
            tracing::info!(
                cutoff = %older_than,
                module = module.unwrap_or(ALL_MODULES),
                count,
                "DRY RUN: Would delete all facts before {}",
                older_than
            );
            return Ok(count);
        }

        let deleted = self
            .facts
            .delete_through(older_than, module, self.batch_size)
            .await?;

        if deleted > 0 {
            tracing::debug!(
                deleted,
                cutoff = %older_than,
                "Deleted all facts before cutoff"
            );
            metrics::record_fact_deletion(module.unwrap_or(ALL_MODULES), deleted);
        }

        Ok(deleted)
    }
}

#[async_trait]
impl CleanupRunner for FactCleanup {
    async fn run(
        &self,
        older_than: &RelativeDuration,
        granularity: &RelativeDuration,
        module: Option<&str>,
    ) -> DbResult<u64> {
        let started = Instant::now();
        let cutoff = older_than
            .subtract_from(Utc::now())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let result = self.cleanup(cutoff, granularity, module).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(count) => {
                tracing::info!(
                    older_than = %older_than,
                    granularity = %granularity,
                    module = module.unwrap_or(ALL_MODULES),
                    cutoff = %cutoff,
                    count,
                    dry_run = self.dry_run,
                    duration_secs = elapsed,
                    "Fact cleanup complete"
                );
                metrics::record_cleanup_run("success", elapsed);
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    older_than = %older_than,
                    module = module.unwrap_or(ALL_MODULES),
                    "Fact cleanup failed"
                );
                metrics::record_cleanup_run("error", elapsed);
            }
        }

        result
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    use super::*;
    use crate::{
        db::{
            DbPool,
            tests::harness::{FactScanFixture, create_sqlite_pool, run_sqlite_migrations},
        },
        models::{CreateFact, CreateHost, Fact, FactQuery, FactStamp},
    };

    async fn create_db() -> DbPool {
        let pool = create_sqlite_pool().await;
        run_sqlite_migrations(&pool).await;
        DbPool::from_sqlite(pool)
    }

    fn repos(db: &DbPool) -> (Arc<dyn crate::db::HostRepo>, Arc<dyn FactRepo>) {
        (db.hosts(), db.facts())
    }

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap()
    }

    fn cleanup_for(db: &DbPool) -> FactCleanup {
        FactCleanup::new(db.facts(), &CleanupConfig::default())
    }

    async fn total(db: &DbPool) -> i64 {
        db.facts().count(FactQuery::default()).await.unwrap()
    }

    /// Seed `hosts` hosts with `scans` daily scans and return the newest fact
    /// timestamp.
    async fn seed(db: &DbPool, hosts: usize, scans: usize) -> DateTime<Utc> {
        let (host_repo, fact_repo) = repos(db);
        let fixture = FactScanFixture {
            host_repo: host_repo.as_ref(),
            fact_repo: fact_repo.as_ref(),
        };
        fixture.hosts(hosts).await;
        let facts = fixture.fact_scans(scans, epoch()).await;
        facts.iter().map(|f| f.timestamp).max().unwrap()
    }

    #[tokio::test]
    async fn test_cleanup_two_day_granularity() {
        let db = create_db().await;
        let newest = seed(&db, 5, 10).await;

        let deleted = cleanup_for(&db)
            .cleanup(newest + Duration::days(365), &RelativeDuration::days(2), None)
            .await
            .unwrap();

        assert_eq!(deleted, 60);
        assert_eq!(total(&db).await, 90);
    }

    #[tokio::test]
    async fn test_cleanup_zero_granularity_from_midpoint() {
        let db = create_db().await;
        seed(&db, 5, 28).await;

        let facts = db.facts().list(FactQuery::default()).await.unwrap();
        let cutoff = facts[facts.len() / 2].timestamp;

        let deleted = cleanup_for(&db)
            .cleanup(cutoff, &RelativeDuration::ZERO, None)
            .await
            .unwrap();

        assert_eq!(deleted, 210);
        assert_eq!(total(&db).await, 210);
    }

    #[tokio::test]
    async fn test_cleanup_single_module() {
        let db = create_db().await;
        let newest = seed(&db, 5, 10).await;

        let deleted = cleanup_for(&db)
            .cleanup(
                newest + Duration::days(365),
                &RelativeDuration::days(2),
                Some("ansible"),
            )
            .await
            .unwrap();

        assert_eq!(deleted, 20);
        let services = db
            .facts()
            .count(FactQuery {
                module: Some("services".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(services, 50);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let db = create_db().await;
        let newest = seed(&db, 3, 10).await;
        let cleanup = cleanup_for(&db);
        let cutoff = newest + Duration::days(365);

        let first = cleanup
            .cleanup(cutoff, &RelativeDuration::days(2), None)
            .await
            .unwrap();
        let second = cleanup
            .cleanup(cutoff, &RelativeDuration::days(2), None)
            .await
            .unwrap();

        assert_eq!(first, 36);
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn test_cleanup_cutoff_is_inclusive() {
        let db = create_db().await;
        seed(&db, 1, 3).await;

        // Exactly on the second scan
        let deleted = cleanup_for(&db)
            .cleanup(epoch() + Duration::days(1), &RelativeDuration::ZERO, None)
            .await
            .unwrap();

        assert_eq!(deleted, 6);
        assert_eq!(total(&db).await, 3);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_facts_newer_than_cutoff() {
        let db = create_db().await;
        seed(&db, 2, 10).await;
        let cutoff = epoch() + Duration::days(4) + Duration::hours(12);

        cleanup_for(&db)
            .cleanup(cutoff, &RelativeDuration::days(3), None)
            .await
            .unwrap();

        let facts = db.facts().list(FactQuery::default()).await.unwrap();
        let newer = facts.iter().filter(|f| f.timestamp > cutoff).count();
        assert_eq!(newer, 5 * 2 * 3);
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_deleting() {
        let db = create_db().await;
        let newest = seed(&db, 5, 10).await;
        let config = CleanupConfig {
            dry_run: true,
            ..Default::default()
        };
        let cleanup = FactCleanup::new(db.facts(), &config);
        assert!(cleanup.is_dry_run());

        let planned = cleanup
            .cleanup(newest + Duration::days(365), &RelativeDuration::days(2), None)
            .await
            .unwrap();
        let purged = cleanup
            .cleanup(newest, &RelativeDuration::ZERO, Some("services"))
            .await
            .unwrap();

        assert_eq!(planned, 60);
        assert_eq!(purged, 50);
        assert_eq!(total(&db).await, 150);
    }

    #[tokio::test]
    async fn test_with_dry_run_only_enables() {
        let db = create_db().await;
        let config = CleanupConfig {
            dry_run: true,
            ..Default::default()
        };

        assert!(FactCleanup::new(db.facts(), &config).with_dry_run(false).is_dry_run());
        assert!(cleanup_for(&db).with_dry_run(true).is_dry_run());
        assert!(!cleanup_for(&db).with_dry_run(false).is_dry_run());
    }

    #[tokio::test]
    async fn test_small_batches_delete_everything_planned() {
        let db = create_db().await;
        let newest = seed(&db, 5, 10).await;
        let config = CleanupConfig {
            batch_size: 7,
            ..Default::default()
        };

        let deleted = FactCleanup::new(db.facts(), &config)
            .cleanup(newest + Duration::days(365), &RelativeDuration::days(2), None)
            .await
            .unwrap();

        assert_eq!(deleted, 60);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let db = create_db().await;

        let deleted = cleanup_for(&db)
            .cleanup(Utc::now(), &RelativeDuration::weeks(1), None)
            .await
            .unwrap();

        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn test_run_resolves_relative_cutoff() {
        let db = create_db().await;
        let (host_repo, fact_repo) = repos(&db);
        let fixture = FactScanFixture {
            host_repo: host_repo.as_ref(),
            fact_repo: fact_repo.as_ref(),
        };
        fixture.hosts(1).await;
        fixture
            .fact_scans(10, Utc::now() - Duration::days(30))
            .await;

        // Scans from 30 through 25 days ago
        let deleted = cleanup_for(&db)
            .run(&RelativeDuration::days(25), &RelativeDuration::ZERO, None)
            .await
            .unwrap();

        assert_eq!(deleted, 18);
        assert_eq!(total(&db).await, 12);
    }

    #[tokio::test]
    async fn test_cutoff_past_year_9999_still_matches_stored_facts() {
        let db = create_db().await;
        seed(&db, 2, 4).await;
        let far_future = Utc.with_ymd_and_hms(10000, 6, 1, 0, 0, 0).unwrap();

        let planned = cleanup_for(&db)
            .cleanup(far_future, &RelativeDuration::years(8000), None)
            .await
            .unwrap();
        assert_eq!(planned, 18);

        let purged = cleanup_for(&db)
            .cleanup(far_future, &RelativeDuration::ZERO, None)
            .await
            .unwrap();
        assert_eq!(purged, 6);
        assert_eq!(total(&db).await, 0);
    }

    #[tokio::test]
    async fn test_sweep_larger_than_sqlite_parameter_limit() {
        let pool = create_sqlite_pool().await;
        run_sqlite_migrations(&pool).await;
        let db = DbPool::from_sqlite(pool.clone());
        let host = db
            .hosts()
            .create(CreateHost {
                name: "bulk-01".to_string(),
            })
            .await
            .unwrap();

        // 33,000 scans one second apart, written in one statement
        sqlx::query(
            r#"
            WITH RECURSIVE seq(n) AS (
                SELECT 0 UNION ALL SELECT n + 1 FROM seq WHERE n < 32999
            )
            INSERT INTO facts (id, host_id, module, timestamp, facts)
            SELECT lower(hex(randomblob(16))), ?, 'ansible',
                   strftime('%Y-%m-%dT%H:%M:%S+00:00', ? + n, 'unixepoch'), '{}'
            FROM seq
            "#,
        )
        .bind(host.id.to_string())
        .bind(epoch().timestamp())
        .execute(&pool)
        .await
        .unwrap();
        assert_eq!(total(&db).await, 33_000);

        let config = CleanupConfig {
            batch_size: 50_000,
            ..Default::default()
        };
        let deleted = FactCleanup::new(db.facts(), &config)
            .cleanup(epoch() + Duration::days(365), &RelativeDuration::days(1), None)
            .await
            .unwrap();

        // One fact closes the bucket ending at the epoch, one survives the next
        assert_eq!(deleted, 32_998);
        assert_eq!(total(&db).await, 2);
    }

    /// Removes one candidate behind the sweep's back, like a concurrent run.
    struct RacingFactRepo {
        inner: Arc<dyn FactRepo>,
    }

    #[async_trait]
    impl FactRepo for RacingFactRepo {
        async fn create(&self, input: CreateFact) -> DbResult<Fact> {
            self.inner.create(input).await
        }

        async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Fact>> {
            self.inner.get_by_id(id).await
        }

        async fn list(&self, query: FactQuery) -> DbResult<Vec<Fact>> {
            self.inner.list(query).await
        }

        async fn count(&self, query: FactQuery) -> DbResult<i64> {
            self.inner.count(query).await
        }

        async fn list_cleanup_candidates(
            &self,
            cutoff: DateTime<Utc>,
            module: Option<&str>,
        ) -> DbResult<Vec<FactStamp>> {
            let candidates = self.inner.list_cleanup_candidates(cutoff, module).await?;
            if let Some(last) = candidates.last() {
                self.inner.delete_by_ids(&[last.id], 1).await?;
            }
            Ok(candidates)
        }

        async fn count_through(&self, cutoff: DateTime<Utc>, module: Option<&str>) -> DbResult<u64> {
            self.inner.count_through(cutoff, module).await
        }

        async fn delete_through(
            &self,
            cutoff: DateTime<Utc>,
            module: Option<&str>,
            batch_size: u32,
        ) -> DbResult<u64> {
            self.inner.delete_through(cutoff, module, batch_size).await
        }

        async fn delete_by_ids(&self, ids: &[Uuid], batch_size: u32) -> DbResult<u64> {
            self.inner.delete_by_ids(ids, batch_size).await
        }
    }

    #[tokio::test]
    async fn test_rows_removed_elsewhere_are_not_counted() {
        let db = create_db().await;
        let newest = seed(&db, 1, 4).await;
        let racing = Arc::new(RacingFactRepo { inner: db.facts() });

        // The oldest candidate of the last group is planned for deletion but
        // already gone when the sweep deletes
        let deleted = FactCleanup::new(racing, &CleanupConfig::default())
            .cleanup(newest, &RelativeDuration::weeks(1), None)
            .await
            .unwrap();

        assert_eq!(deleted, 8);
        assert_eq!(total(&db).await, 3);
    }

    #[tokio::test]
    async fn test_run_with_unrepresentable_cutoff_deletes_nothing() {
        let db = create_db().await;
        seed(&db, 1, 3).await;

        let deleted = cleanup_for(&db)
            .run(&RelativeDuration::years(u32::MAX), &RelativeDuration::ZERO, None)
            .await
            .unwrap();

        assert_eq!(deleted, 0);
        assert_eq!(total(&db).await, 9);
    }
}
