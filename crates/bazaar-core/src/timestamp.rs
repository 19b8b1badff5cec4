//! # Timestamps
//!
//! Each marketplace speaks its own date dialect. Everything is normalized to
//! `DateTime<Utc>` at the connector boundary and stored as RFC 3339.
//!
//! ```text
//! yandex  "17-10-2026 12:00:00"   wall clock, Moscow (UTC+3)
//! uzum    1792227600000           Unix epoch, milliseconds
//! kaspi   "2026-10-17T09:00:00Z"  RFC 3339
//! store   "2026-10-17T09:00:00+00:00"
//! ```

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, SecondsFormat, TimeZone, Utc,
};

use crate::error::{CoreError, CoreResult};

/// Moscow has no DST, so a fixed offset is exact.
const MOSCOW_OFFSET_SECS: i32 = 3 * 3600;

const YANDEX_DATETIME_FORMAT: &str = "%d-%m-%Y %H:%M:%S";
const YANDEX_DATE_FORMAT: &str = "%d-%m-%Y";

fn moscow() -> FixedOffset {
    FixedOffset::east_opt(MOSCOW_OFFSET_SECS).unwrap_or(Utc.fix())
}

fn invalid(value: &str, expected: &str) -> CoreError {
    CoreError::InvalidTimestamp {
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

// =============================================================================
// Yandex Market
// =============================================================================

/// Parses `dd-MM-yyyy HH:mm:ss` (or a bare `dd-MM-yyyy`) as Moscow time.
pub fn parse_moscow_dmy(raw: &str) -> CoreResult<DateTime<Utc>> {
    let text = raw.trim();
    let naive = match NaiveDateTime::parse_from_str(text, YANDEX_DATETIME_FORMAT) {
        Ok(dt) => dt,
        Err(_) => NaiveDate::parse_from_str(text, YANDEX_DATE_FORMAT)
            .map_err(|_| invalid(raw, "dd-MM-yyyy HH:mm:ss"))?
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| invalid(raw, "dd-MM-yyyy HH:mm:ss"))?,
    };

    moscow()
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| invalid(raw, "dd-MM-yyyy HH:mm:ss"))
}

/// Formats the calendar date Yandex expects in order-list filters.
pub fn format_moscow_date(at: DateTime<Utc>) -> String {
    at.with_timezone(&moscow()).format(YANDEX_DATE_FORMAT).to_string()
}

// =============================================================================
// Uzum Market
// =============================================================================

/// Converts epoch milliseconds.
pub fn from_epoch_millis(millis: i64) -> CoreResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| invalid(&millis.to_string(), "epoch milliseconds"))
}

pub fn to_epoch_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

// =============================================================================
// Kaspi and the store
// =============================================================================

/// Parses RFC 3339 with any offset.
pub fn parse_rfc3339(raw: &str) -> CoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| invalid(raw, "RFC 3339"))
}

/// Renders a timestamp the way the store keeps it.
pub fn to_store(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, false)
}
