//! Millisecond timestamps and the flexible parser used for `since` queries.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    #[error("unrecognized timestamp: {0}")]
    Unrecognized(String),
}

/// Current wall-clock time in Unix milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    to_millis(OffsetDateTime::now_utc())
}

/// Parse a timestamp given as integer milliseconds, RFC 3339 (with or
/// without fractional seconds), or `YYYY-MM-DD HH:MM:SS[.fffffff]` in UTC.
///
/// # Errors
///
/// Returns [`TimestampError::Unrecognized`] when no format matches.
pub fn parse_flexible(raw: &str) -> Result<i64, TimestampError> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(ms);
    }
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(to_millis(dt));
    }
    if let Ok(dt) = PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]")) {
        return Ok(to_millis(dt.assume_utc()));
    }
    if let Ok(dt) = PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day] [hour]:[minute]:[second]")) {
        return Ok(to_millis(dt.assume_utc()));
    }
    Err(TimestampError::Unrecognized(raw.to_owned()))
}

/// RFC 3339 rendering in UTC; falls back to the raw number when out of range.
#[must_use]
pub fn format_rfc3339(ms: i64) -> String {
    from_millis(ms)
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_else(|| ms.to_string())
}

/// Short human form `dd.mm.yyyy HH:MM` (UTC), as shown in version lists.
#[must_use]
pub fn format_display(ms: i64) -> String {
    from_millis(ms)
        .and_then(|dt| dt.format(format_description!("[day].[month].[year] [hour]:[minute]")).ok())
        .unwrap_or_else(|| "-".to_owned())
}

fn to_millis(dt: OffsetDateTime) -> i64 {
    i64::try_from(dt.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

fn from_millis(ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
}

#[cfg(test)]
#[path = "timestamp_test.rs"]
mod tests;
