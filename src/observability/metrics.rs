//! Prometheus metrics for fact cleanup.
//!
//! Provides metrics for:
//! - Facts deleted per module
//! - Sweep outcomes and durations
//!
//! Sweeps run as batch jobs, so there is no scrape endpoint. After a sweep the
//! rendered metrics can be written to a file for the node_exporter textfile
//! collector.

use std::path::Path;
#[cfg(feature = "prometheus")]
use std::sync::OnceLock;

#[cfg(feature = "prometheus")]
use metrics::{counter, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

/// Global Prometheus handle used to render the textfile.
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics system with the given configuration.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
            &config.duration_buckets_secs,
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?;

    let handle = builder.install_recorder().map_err(MetricsError::Install)?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::Setup("Metrics already initialized".to_string()))?;

    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(_config: &MetricsConfig) -> Result<(), MetricsError> {
    Ok(())
}

/// Get the Prometheus handle for rendering metrics.
#[cfg(feature = "prometheus")]
pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record facts deleted by a sweep.
///
/// # Arguments
/// * `module` - The module the facts belonged to, or `"all"` for an
///   unfiltered purge
/// * `count` - The number of facts deleted
pub fn record_fact_deletion(module: &str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "fact_cleanup_deletions_total",
            "module" => module.to_string()
        )
        .increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (module, count);
    }
}

/// Record the outcome of one sweep.
///
/// # Arguments
/// * `status` - `"success"` or `"error"`
/// * `duration_secs` - Wall-clock time of the sweep
pub fn record_cleanup_run(status: &str, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("fact_cleanup_runs_total", "status" => status.to_string()).increment(1);
        histogram!("fact_cleanup_duration_seconds").record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (status, duration_secs);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Textfile Export
// ─────────────────────────────────────────────────────────────────────────────

/// Write the current metrics to `config.textfile_path`, if configured.
///
/// Returns whether a file was written. Does nothing when metrics are disabled
/// or were never initialized.
pub fn write_textfile(config: &MetricsConfig) -> Result<bool, MetricsError> {
    let Some(path) = config.textfile_path.as_deref() else {
        return Ok(false);
    };
    if !config.enabled {
        return Ok(false);
    }

    #[cfg(feature = "prometheus")]
    {
        let Some(handle) = get_prometheus_handle() else {
            return Ok(false);
        };
        write_rendered(Path::new(path), &handle.render())?;
        tracing::debug!(path, "Wrote metrics textfile");
        Ok(true)
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = path;
        Ok(false)
    }
}

/// Replace `path` with `contents` via a sibling temp file, so the collector
/// never reads a partial file.
#[cfg_attr(not(feature = "prometheus"), allow(dead_code))]
fn write_rendered(path: &Path, contents: &str) -> Result<(), MetricsError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");

    std::fs::write(&tmp, contents).map_err(|e| MetricsError::Io(e, path.to_path_buf()))?;
    std::fs::rename(&tmp, path).map_err(|e| MetricsError::Io(e, path.to_path_buf()))?;

    Ok(())
}

/// Metrics errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),

    #[error("Failed to write metrics file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),
}
