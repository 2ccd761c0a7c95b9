//! Defaulting rules applied to every entity read from or written to storage.

use chrono::{DateTime, Datelike, Utc};
use tracing::warn;

use super::types::CrawlerEngine;
use crate::datetime::is_zero_value;

/// Channel IDs at or below zero denote virtual, non-persisted channels.
pub fn is_virtual_channel(channel_id: i64) -> bool {
    channel_id <= 0
}

/// Non-positive or out-of-range stored intervals mean "use the system default".
pub fn normalize_refresh_interval(stored: Option<i64>) -> Option<u32> {
    stored
        .filter(|minutes| *minutes > 0)
        .and_then(|minutes| u32::try_from(minutes).ok())
}

/// Decode the stored crawler engine code once, at the storage boundary.
pub fn decode_engine(stored: Option<i64>) -> Option<CrawlerEngine> {
    let code = stored?;
    let engine = CrawlerEngine::from_code(code);
    if engine.is_none() {
        warn!("Unknown crawler engine code {}, using system default", code);
    }
    engine
}

/// Latest year whose timestamps keep the fixed-width storage form.
const MAX_STORED_YEAR: i32 = 9999;

/// Absent, zero-value or beyond-year-9999 publishing dates become the
/// ingestion time.
pub fn normalize_publishing_date(
    date: Option<DateTime<Utc>>,
    ingested_at: DateTime<Utc>,
) -> DateTime<Utc> {
    match date {
        Some(date) if !is_zero_value(&date) && date.year() <= MAX_STORED_YEAR => date,
        _ => ingested_at,
    }
}
