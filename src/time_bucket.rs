//! Time handling - Unix millisecond timestamps and day buckets
//!
//! All rows store a raw `i64` millisecond timestamp plus a `YYYY-MM-DD`
//! day bucket (UTC). Buckets make window queries plain lexicographic
//! string comparisons, so the weekly and monthly views never parse dates
//! inside SQL.

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};

/// Current time as Unix milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// UTC day bucket for a millisecond timestamp
pub fn day_bucket(ts_ms: i64) -> String {
    let dt = DateTime::<Utc>::from_timestamp_millis(ts_ms).unwrap_or_default();
    dt.format("%Y-%m-%d").to_string()
}

/// Today's day bucket (UTC)
pub fn current_day_bucket() -> String {
    day_bucket(now_ms())
}

/// Today's date (UTC)
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Bucket of the Monday that starts the given date's ISO week
pub fn week_start_bucket(date: NaiveDate) -> String {
    date.week(Weekday::Mon)
        .first_day()
        .format("%Y-%m-%d")
        .to_string()
}

/// Bucket of the first day of the given date's month
pub fn month_start_bucket(date: NaiveDate) -> String {
    format!("{:04}-{:02}-01", date.year(), date.month())
}

/// Parse a `YYYY-MM-DD` bucket back into a date
pub fn parse_day_bucket(bucket: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(bucket, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_bucket_is_utc_date() {
        // 2026-08-23T12:00:00Z
        assert_eq!(day_bucket(1787486400000), "2026-08-23");
        // Epoch
        assert_eq!(day_bucket(0), "1970-01-01");
    }

    #[test]
    fn test_week_starts_on_monday() {
        // 2026-08-23 is a Sunday; its ISO week starts 2026-08-17
        let sunday = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();
        assert_eq!(week_start_bucket(sunday), "2026-08-17");

        // A Monday is its own week start
        let monday = NaiveDate::from_ymd_opt(2026, 8, 17).unwrap();
        assert_eq!(week_start_bucket(monday), "2026-08-17");
    }

    #[test]
    fn test_month_start() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();
        assert_eq!(month_start_bucket(date), "2026-08-01");
    }

    #[test]
    fn test_buckets_compare_lexicographically() {
        // The window queries rely on string order matching date order
        assert!("2026-08-17" < "2026-08-23");
        assert!("2026-07-31" < "2026-08-01");
        assert!("2025-12-31" < "2026-01-01");
    }

    #[test]
    fn test_parse_roundtrip() {
        let bucket = current_day_bucket();
        let date = parse_day_bucket(&bucket).unwrap();
        assert_eq!(date.format("%Y-%m-%d").to_string(), bucket);
        assert!(parse_day_bucket("not-a-date").is_none());
    }
}
