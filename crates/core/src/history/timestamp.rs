//! Parsing of the point-in-time parameter.

use chrono::{DateTime, NaiveDateTime, Utc};

use super::error::HistoryError;

/// Space-separated format accepted besides RFC 3339, read as UTC.
pub const PLAIN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parses and checks a point-in-time parameter against `now`.
///
/// # Errors
///
/// Returns `MissingTimestamp` for a blank value, `InvalidTimestamp` for an unknown
/// format, or `FutureTimestamp` for an instant after `now`.
pub fn parse_timestamp(raw: Option<&str>, now: DateTime<Utc>) -> Result<DateTime<Utc>, HistoryError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(HistoryError::MissingTimestamp)?;

    let at = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, PLAIN_FORMAT).map(|dt| dt.and_utc()))
        .map_err(|_| HistoryError::InvalidTimestamp(raw.to_string()))?;

    if at > now {
        return Err(HistoryError::FutureTimestamp(at));
    }
    Ok(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[rstest]
    #[case("2024-01-15T10:30:00Z")]
    #[case("2024-01-15T07:30:00-03:00")]
    #[case("2024-01-15 10:30:00")]
    #[case(" 2024-01-15T10:30:00Z ")]
    fn test_accepted_formats(#[case] raw: &str) {
        assert_eq!(
            parse_timestamp(Some(raw), now()),
            Ok(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap())
        );
    }

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[case(Some("   "))]
    fn test_missing(#[case] raw: Option<&str>) {
        assert_eq!(parse_timestamp(raw, now()), Err(HistoryError::MissingTimestamp));
    }

    #[rstest]
    #[case("2024-01-15")]
    #[case("15/01/2024 10:30:00")]
    #[case("yesterday")]
    fn test_invalid(#[case] raw: &str) {
        assert!(matches!(
            parse_timestamp(Some(raw), now()),
            Err(HistoryError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_future_rejected() {
        assert!(matches!(
            parse_timestamp(Some("2024-06-01T12:00:01Z"), now()),
            Err(HistoryError::FutureTimestamp(_))
        ));
        assert_eq!(
            parse_timestamp(Some("2024-06-01T12:00:00Z"), now()),
            Ok(now())
        );
    }
}
