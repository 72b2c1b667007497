mod facts;
mod hosts;

use chrono::{DateTime, Utc};
pub use facts::*;
pub use hosts::*;

use super::error::{DbError, DbResult};

/// Truncate a timestamp to millisecond precision.
///
/// Fact timestamps are compared against cutoffs that are often read back from
/// the database, so they must survive a round trip unchanged. Both backends
/// keep at least millisecond precision.
///
/// # Example
///
/// ```ignore
/// use crate::db::repos::truncate_to_millis;
///
/// let timestamp = truncate_to_millis(Utc::now());
/// ```
pub fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or(dt)
}

/// 0000-01-01T00:00:00Z, the earliest timestamp a fact can carry.
const EARLIEST_STORABLE_MILLIS: i64 = -62_167_219_200_000;

/// 9999-12-31T23:59:59.999Z, the latest timestamp a fact can carry.
const LATEST_STORABLE_MILLIS: i64 = 253_402_300_799_999;

/// Earliest instant the stores can hold.
///
/// SQLite compares timestamps as RFC 3339 text, which only sorts correctly for
/// four-digit years, so both backends share this range.
pub fn earliest_storable() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(EARLIEST_STORABLE_MILLIS).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Latest instant the stores can hold.
pub fn latest_storable() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(LATEST_STORABLE_MILLIS).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Reject fact timestamps outside [`earliest_storable`]..=[`latest_storable`].
pub(crate) fn validate_fact_timestamp(timestamp: DateTime<Utc>) -> DbResult<()> {
    if timestamp < earliest_storable() || timestamp > latest_storable() {
        return Err(DbError::Validation(format!(
            "Fact timestamp {} is outside the years 0000 to 9999",
            timestamp
        )));
    }
    Ok(())
}

/// Normalize a batch size coming from configuration.
///
/// A batch size of zero would never make progress, so it is treated as one.
pub(crate) fn effective_batch_size(batch_size: u32) -> usize {
    batch_size.max(1) as usize
}
