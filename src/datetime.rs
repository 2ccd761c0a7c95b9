//! Date/time helpers shared by the storage layer.
//!
//! Timestamps are stored as RFC 3339 text. Older rows written by SQLite's
//! `datetime('now')` use the `YYYY-MM-DD HH:MM:SS` form, so both are accepted on read.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Parse a stored datetime string to `DateTime<Utc>`.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

/// Format a timestamp for storage.
///
/// Fixed-width UTC form for years 0000 through 9999, so stored values order
/// correctly as text. Later years gain a sign and a fifth digit and no longer
/// parse back; callers keep such dates out of storage.
pub fn to_db_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Whether a timestamp is a "zero value" placeholder rather than a real date.
///
/// Feeds without dates commonly surface either the Unix epoch or the minimum
/// representable date (year 1).
pub fn is_zero_value(dt: &DateTime<Utc>) -> bool {
    dt.timestamp() == 0 || *dt <= min_date()
}

fn min_date() -> DateTime<Utc> {
    // 0001-01-01T00:00:00Z
    DateTime::from_timestamp(-62_135_596_800, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
