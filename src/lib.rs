//! Down-sampling retention cleanup for historical host fact scans.
//!
//! The library exposes the fact store, the bucket planner and the cleanup
//! runner; the `factsweep` binary wires them to a command line.

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod db;
pub mod models;
pub mod observability;
pub mod retention;
