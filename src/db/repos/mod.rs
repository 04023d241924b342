mod route_history;

use chrono::{DateTime, Duration, Utc};
pub use route_history::*;

/// Truncate a timestamp to microsecond precision.
///
/// PostgreSQL keeps microseconds while SQLite stores whatever text it is
/// given, so values are truncated before insert to compare identically on
/// both backends after a round trip.
pub fn truncate_to_micros(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(dt.timestamp_micros()).unwrap_or(dt)
}

/// `modified` timestamps for a batch of `len` records written at `now`.
///
/// Each record gets its own timestamp, one microsecond apart in batch order,
/// so newest-first ordering matches insertion order within a batch.
pub fn batch_timestamps(now: DateTime<Utc>, len: usize) -> Vec<DateTime<Utc>> {
    let base = truncate_to_micros(now);
    (0..len)
        .map(|i| base + Duration::microseconds(i as i64))
        .collect()
}
