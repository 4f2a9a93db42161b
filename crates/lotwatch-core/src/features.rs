//! Calendar feature extraction for the vehicle-count forecaster.
//!
//! The forecasting model was trained on four calendar features derived
//! from each timestamp, in this column order:
//!
//! | Column | Range | Meaning |
//! |--------|-------|---------|
//! | `hour` | 0–23 | hour of day |
//! | `day_of_week` | 0–6 | Monday = 0 |
//! | `day_of_month` | 1–31 | day of month |
//! | `month` | 1–12 | month of year |
//!
//! Timestamps carrying a UTC offset are evaluated on the wall clock of
//! that offset; naive timestamps are taken as-is.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;

use crate::error::{ServeError, ServeResult};

/// Number of feature columns produced per timestamp.
pub const FEATURE_COUNT: usize = 4;

/// Column names in model order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = ["hour", "day_of_week", "day_of_month", "month"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Calendar features for one input timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimestampFeatureRow {
    pub hour: u32,
    pub day_of_week: u32,
    pub day_of_month: u32,
    pub month: u32,
}

impl TimestampFeatureRow {
    pub fn from_datetime(dt: &NaiveDateTime) -> Self {
        Self {
            hour: dt.hour(),
            day_of_week: dt.weekday().num_days_from_monday(),
            day_of_month: dt.day(),
            month: dt.month(),
        }
    }

    /// The row as a dense model input, in [`FEATURE_NAMES`] order.
    pub fn to_array(&self) -> [f32; FEATURE_COUNT] {
        [
            self.hour as f32,
            self.day_of_week as f32,
            self.day_of_month as f32,
            self.month as f32,
        ]
    }
}

/// Parse a caller-supplied timestamp string.
///
/// Accepts RFC 3339 (`2024-01-15T10:30:00+10:00`), naive date-times with
/// `T` or space separators and optional seconds/fractions, and bare dates
/// (midnight).
pub fn parse_timestamp(raw: &str) -> ServeResult<NaiveDateTime> {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_local());
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }

    Err(ServeError::invalid_input(format!(
        "invalid timestamp: '{}'",
        raw
    )))
}

/// Convert timestamps into feature rows, preserving input order.
///
/// Fails on the first unparseable entry.
pub fn extract_features<S: AsRef<str>>(timestamps: &[S]) -> ServeResult<Vec<TimestampFeatureRow>> {
    timestamps
        .iter()
        .map(|ts| parse_timestamp(ts.as_ref()).map(|dt| TimestampFeatureRow::from_datetime(&dt)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naive_iso_timestamp() {
        let rows = extract_features(&["2024-01-15T10:30:00"]).unwrap();
        assert_eq!(
            rows[0],
            TimestampFeatureRow {
                hour: 10,
                day_of_week: 0, // Monday
                day_of_month: 15,
                month: 1,
            }
        );
    }

    #[test]
    fn test_sunday_is_six() {
        let rows = extract_features(&["2024-01-21 23:59:59"]).unwrap();
        assert_eq!(rows[0].day_of_week, 6);
        assert_eq!(rows[0].hour, 23);
    }

    #[test]
    fn test_offset_uses_local_wall_clock() {
        let rows = extract_features(&["2024-03-01T08:15:00+10:00"]).unwrap();
        assert_eq!(rows[0].hour, 8);
        assert_eq!(rows[0].day_of_month, 1);
        assert_eq!(rows[0].month, 3);
    }

    #[test]
    fn test_utc_suffix_and_fraction() {
        let dt = parse_timestamp("2024-06-30T17:05:09.250Z").unwrap();
        assert_eq!(dt.hour(), 17);
        assert_eq!(dt.day(), 30);
    }

    #[test]
    fn test_date_only_is_midnight() {
        let rows = extract_features(&["2024-12-25"]).unwrap();
        assert_eq!(rows[0].hour, 0);
        assert_eq!(rows[0].month, 12);
        assert_eq!(rows[0].day_of_week, 2); // Wednesday
    }

    #[test]
    fn test_minutes_without_seconds() {
        let dt = parse_timestamp("2024-02-29 06:45").unwrap();
        assert_eq!(dt.minute(), 45);
        assert_eq!(dt.day(), 29);
    }

    #[test]
    fn test_order_preserved() {
        let rows = extract_features(&["2024-01-01T05:00:00", "2024-01-01T01:00:00"]).unwrap();
        assert_eq!(rows[0].hour, 5);
        assert_eq!(rows[1].hour, 1);
    }

    #[test]
    fn test_unparseable_rejected() {
        let err = extract_features(&["2024-01-15T10:30:00", "not a date"]).unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("not a date"));
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(parse_timestamp("2024-13-01T00:00:00").is_err());
        assert!(parse_timestamp("2024-01-01T25:00:00").is_err());
    }

    #[test]
    fn test_array_order_matches_names() {
        let row = TimestampFeatureRow {
            hour: 1,
            day_of_week: 2,
            day_of_month: 3,
            month: 4,
        };
        assert_eq!(row.to_array(), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(FEATURE_NAMES[2], "day_of_month");
    }
}
