//! Down-sampling retention for historical fact scans.
//!
//! Facts older than a cutoff are thinned out rather than purged: within each
//! (host, module) history the newest fact per granularity-wide bucket is kept
//! and the rest are deleted. The pieces are:
//! 1. [`duration`]: the `<integer><d|w|m|y>` durations used for cutoffs and buckets
//! 2. [`sweeper`]: the pure planner deciding which facts go
//! 3. [`cleanup`]: the planner bound to a fact store, with dry-run support
//! 4. [`worker`]: a periodic loop running the sweep from configuration

pub mod cleanup;
pub mod duration;
pub mod sweeper;
mod worker;

pub use cleanup::{CleanupRunner, FactCleanup};
pub use duration::{ParseDurationError, RelativeDuration, parse_duration};
pub use worker::start_cleanup_worker;
