//! Scheduled fact cleanup.
//!
//! Runs the configured sweep at a fixed interval until the task is cancelled.
//! Failed runs are logged and retried on the next tick.

use crate::{config::CleanupSchedule, retention::CleanupRunner};

/// Starts the cleanup worker loop.
///
/// Returns immediately when the schedule is disabled.
pub async fn start_cleanup_worker(runner: &dyn CleanupRunner, schedule: CleanupSchedule) {
    if !schedule.enabled {
        tracing::info!("Cleanup worker disabled by configuration");
        return;
    }

    let dry_run_msg = if runner.is_dry_run() {
        " (DRY RUN)"
    } else {
        ""
    };

    tracing::info!(
        interval_hours = schedule.interval_hours,
        older_than = %schedule.older_than,
        granularity = %schedule.granularity,
        module = schedule.module.as_deref().unwrap_or("all"),
        dry_run = runner.is_dry_run(),
        "Starting cleanup worker{}",
        dry_run_msg
    );

    let interval = schedule.interval();

    loop {
        run_scheduled(runner, &schedule).await;
        tokio::time::sleep(interval).await;
    }
}

/// Run one scheduled sweep, logging instead of propagating errors.
async fn run_scheduled(runner: &dyn CleanupRunner, schedule: &CleanupSchedule) -> Option<u64> {
    match runner
        .run(
            &schedule.older_than,
            &schedule.granularity,
            schedule.module.as_deref(),
        )
        .await
    {
        Ok(count) => {
            if count == 0 {
                tracing::debug!("Cleanup run complete, no facts to delete");
            }
            Some(count)
        }
        Err(e) => {
            tracing::error!(error = %e, "Error running scheduled fact cleanup");
            None
        }
    }
}
