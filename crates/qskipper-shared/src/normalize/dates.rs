//! Date coercion over the encodings the backend has been seen to emit.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::debug;

/// Supported encodings, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// `2024-03-10T14:30:00Z`, `2024-03-10T14:30:00+05:30`
    IsoStrict,
    /// `2024-03-10T14:30:00.123Z`, `2024-03-10T14:30:00.123456+05:30`
    IsoFractional,
    /// `yyyy-MM-dd'T'HH:mm:ss.SSS'Z'`
    MillisZulu,
    /// `yyyy-MM-dd'T'HH:mm:ss'Z'`
    SecondsZulu,
    /// `2024-03-10T20:00:00.000+0530`
    OffsetMillis,
    /// `2024-03-10T20:00:00+0530`
    OffsetSeconds,
    /// `2024-03-10`, read as midnight UTC
    PlainDate,
    /// `2024-03-10 14:30:00` in the local timezone
    LocalDateTime,
}

impl DateFormat {
    pub const ALL: [DateFormat; 8] = [
        DateFormat::IsoStrict,
        DateFormat::IsoFractional,
        DateFormat::MillisZulu,
        DateFormat::SecondsZulu,
        DateFormat::OffsetMillis,
        DateFormat::OffsetSeconds,
        DateFormat::PlainDate,
        DateFormat::LocalDateTime,
    ];

    pub fn parse(self, s: &str) -> Option<DateTime<Utc>> {
        match self {
            Self::IsoStrict if !s.contains('.') => rfc3339(s),
            Self::IsoFractional if s.contains('.') => rfc3339(s),
            Self::IsoStrict | Self::IsoFractional => None,
            Self::MillisZulu => naive_utc(s, "%Y-%m-%dT%H:%M:%S%.3fZ"),
            Self::SecondsZulu => naive_utc(s, "%Y-%m-%dT%H:%M:%SZ"),
            Self::OffsetMillis => offset(s, "%Y-%m-%dT%H:%M:%S%.3f%z"),
            Self::OffsetSeconds => offset(s, "%Y-%m-%dT%H:%M:%S%z"),
            Self::PlainDate => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc()),
            Self::LocalDateTime => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .and_then(|naive| Local.from_local_datetime(&naive).earliest())
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

fn rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn naive_utc(s: &str, fmt: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, fmt)
        .ok()
        .map(|dt| dt.and_utc())
}

fn offset(s: &str, fmt: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, fmt)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// First matching format wins. An unparseable string is logged and yields
/// `None`.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let parsed = DateFormat::ALL.iter().find_map(|format| format.parse(s));
    if parsed.is_none() {
        debug!(value = %s, "Unrecognized date format, treating as absent");
    }
    parsed
}

pub fn date_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date(s),
        Value::Null => None,
        other => {
            debug!(value = %other, "Non-string date value, treating as absent");
            None
        }
    }
}
