use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::SourceType;

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

/// Fixed-width RFC 3339 so that text ordering in SQL matches time ordering.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_source_type(value: &str) -> Result<SourceType> {
    match value {
        "manual" => Ok(SourceType::Manual),
        "pomodoro" => Ok(SourceType::Pomodoro),
        "youtube" => Ok(SourceType::Youtube),
        "pdf" => Ok(SourceType::Pdf),
        "notes" => Ok(SourceType::Notes),
        other => Err(anyhow!("unknown session source type {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn datetime_round_trips_at_millisecond_precision() {
        let value = Utc.with_ymd_and_hms(2024, 3, 9, 8, 5, 0).unwrap();
        let formatted = format_datetime(&value);
        assert_eq!(formatted, "2024-03-09T08:05:00.000Z");
        assert_eq!(parse_datetime(&formatted, "started_at").unwrap(), value);
    }

    #[test]
    fn negative_integers_are_rejected() {
        assert!(to_u64(-1, "duration_seconds").is_err());
        assert_eq!(to_u64(42, "duration_seconds").unwrap(), 42);
    }

    #[test]
    fn source_types_parse_from_their_column_values() {
        for source in [
            SourceType::Manual,
            SourceType::Pomodoro,
            SourceType::Youtube,
            SourceType::Pdf,
            SourceType::Notes,
        ] {
            assert_eq!(parse_source_type(source.as_str()).unwrap(), source);
        }
        assert!(parse_source_type("Manual").is_err());
    }
}
