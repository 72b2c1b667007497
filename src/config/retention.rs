//! Fact cleanup configuration.
//!
//! Controls how retention sweeps delete facts and, optionally, a schedule for
//! running them periodically from the `worker` command.
//!
//! # Example
//!
//! ```toml
//! [cleanup]
//! dry_run = false
//! batch_size = 1000
//!
//! [cleanup.schedule]
//! enabled = true
//! interval_hours = 24
//! older_than = "120d"
//! granularity = "1w"
//! module = "ansible"
//! ```

use serde::{Deserialize, Serialize};

use crate::retention::RelativeDuration;

/// Fact cleanup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanupConfig {
    /// If true, log what would be deleted without actually deleting.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,

    /// Batch size for delete operations.
    /// Records are deleted in batches to avoid locking the database.
    /// Default: 1000
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Periodic sweep run by the `worker` command.
    #[serde(default)]
    pub schedule: CleanupSchedule,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: default_batch_size(),
            schedule: CleanupSchedule::default(),
        }
    }
}

fn default_batch_size() -> u32 {
    1000
}

/// Schedule for the cleanup worker.
///
/// Durations use the same `<integer><d|w|m|y>` form as the command line and
/// are rejected at load time if malformed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanupSchedule {
    /// Whether the worker sweeps at all.
    /// Default: false (must be explicitly enabled)
    #[serde(default)]
    pub enabled: bool,

    /// How often to sweep (in hours).
    /// Default: 24 (once per day)
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Facts older than this are candidates for deletion.
    /// Default: 120d
    #[serde(default = "default_older_than")]
    pub older_than: RelativeDuration,

    /// Width of the buckets in which one fact is kept. `0d` keeps none.
    /// Default: 1w
    #[serde(default = "default_granularity")]
    pub granularity: RelativeDuration,

    /// Restrict the sweep to one module. Default: all modules.
    #[serde(default)]
    pub module: Option<String>,
}

impl Default for CleanupSchedule {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_interval_hours(),
            older_than: default_older_than(),
            granularity: default_granularity(),
            module: None,
        }
    }
}

fn default_interval_hours() -> u64 {
    24
}

fn default_older_than() -> RelativeDuration {
    RelativeDuration::days(120)
}

fn default_granularity() -> RelativeDuration {
    RelativeDuration::weeks(1)
}

impl CleanupConfig {
    /// Check settings serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.schedule.enabled && self.schedule.interval_hours == 0 {
            return Err("cleanup.schedule.interval_hours must be greater than 0".into());
        }
        if let Some(module) = &self.schedule.module
            && module.trim().is_empty()
        {
            return Err("cleanup.schedule.module cannot be empty; omit it to sweep all modules".into());
        }
        Ok(())
    }
}

impl CleanupSchedule {
    /// Get the interval as a Duration.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_hours.saturating_mul(3600))
    }
}
