//! Sortable timestamps and calendar months.
//!
//! Trip times are kept as local date-times at minute precision. They render
//! as `YYYY-MM-DD HH:MM`, which is also the stored form, but every
//! comparison goes through the parsed value rather than the string.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Display and storage format.
const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Accepted input layouts, tried in order after RFC 3339.
const PARSE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y. %m. %d. %H:%M",
    "%Y. %m. %d. %p %I:%M",
];

/// Korean meridiem markers and their `%p` equivalents.
const MERIDIEMS: [(&str, &str); 2] = [("오전", "AM"), ("오후", "PM")];

/// A local date-time with minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    /// The current local time.
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Local::now().naive_local())
    }

    /// Wrap a date-time, dropping seconds and sub-seconds.
    #[must_use]
    pub fn from_datetime(dt: NaiveDateTime) -> Self {
        let truncated = dt
            .with_second(0)
            .and_then(|d| d.with_nanosecond(0))
            .unwrap_or(dt);
        Self(truncated)
    }

    /// Parse a timestamp from any of the accepted layouts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if no layout matches.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
            return Ok(Self::from_datetime(
                dt.with_timezone(&Local).naive_local(),
            ));
        }

        let normalized = MERIDIEMS
            .iter()
            .fold(input.to_string(), |acc, &(ko, en)| acc.replace(ko, en));

        PARSE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
            .map(Self::from_datetime)
            .ok_or_else(|| Error::invalid_input("timestamp", input))
    }

    /// The underlying date-time.
    #[must_use]
    pub fn as_datetime(&self) -> NaiveDateTime {
        self.0
    }

    /// The calendar date portion.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.0.date()
    }

    /// The calendar month this timestamp falls in.
    #[must_use]
    pub fn month(&self) -> MonthKey {
        MonthKey::from_date(self.date())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DISPLAY_FORMAT))
    }
}

impl FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Parse a `YYYY-MM-DD` calendar date.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the input is not a valid date.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| Error::invalid_input("date", input))
}

/// A calendar month, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// Build a month key, validating the month number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `month` is not in `1..=12`.
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if (1..=12).contains(&month) {
            Ok(Self { year, month })
        } else {
            Err(Error::invalid_input("month", format!("{year:04}-{month:02}")))
        }
    }

    /// The month containing `date`.
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The current local month.
    #[must_use]
    pub fn current() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    /// Year component.
    #[must_use]
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Month component (1-12).
    #[must_use]
    pub fn month(&self) -> u32 {
        self.month
    }

    /// The month before this one.
    #[must_use]
    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Whether `date` falls in this month.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// Human-readable label, e.g. `2024년 3월`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}년 {}월", self.year, self.month)
    }

    /// This month and the `count - 1` months before it, newest first.
    #[must_use]
    pub fn recent(self, count: usize) -> Vec<Self> {
        std::iter::successors(Some(self), |m| Some(m.previous()))
            .take(count)
            .collect()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (year, month) = trimmed
            .split_once('-')
            .ok_or_else(|| Error::invalid_input("month", s))?;
        let year: i32 = year.parse().map_err(|_| Error::invalid_input("month", s))?;
        let month: u32 = month.parse().map_err(|_| Error::invalid_input("month", s))?;
        Self::new(year, month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    #[test]
    fn test_display_round_trips_storage_form() {
        let stamp = ts("2024-01-05 10:00");
        assert_eq!(stamp.to_string(), "2024-01-05 10:00");
    }

    #[test]
    fn test_parse_drops_seconds() {
        let stamp = ts("2024-01-05 10:00:59");
        assert_eq!(stamp.to_string(), "2024-01-05 10:00");
    }

    #[test]
    fn test_parse_dotted_locale_form() {
        let stamp = ts("2024. 1. 5. 09:30");
        assert_eq!(stamp.to_string(), "2024-01-05 09:30");
    }

    #[test]
    fn test_parse_korean_meridiem_form() {
        assert_eq!(ts("2024. 1. 5. 오전 10:00").to_string(), "2024-01-05 10:00");
        assert_eq!(ts("2024. 1. 5. 오후 03:10").to_string(), "2024-01-05 15:10");
        assert_eq!(ts("2024. 12. 31. 오전 12:05").to_string(), "2024-12-31 00:05");
        assert_eq!(ts("2024. 12. 31. 오후 12:05").to_string(), "2024-12-31 12:05");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = Timestamp::parse("yesterday").unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_ordering_is_chronological_not_lexical() {
        // "2024. 10. 1." sorts before "2024. 9. 1." as a string.
        let october = ts("2024. 10. 1. 08:00");
        let september = ts("2024. 9. 1. 08:00");
        assert!(september < october);
    }

    #[test]
    fn test_date_and_month() {
        let stamp = ts("2024-02-29 23:59");
        assert_eq!(stamp.date(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(stamp.month().to_string(), "2024-02");
    }

    #[test]
    fn test_serde_uses_display_form() {
        let stamp = ts("2024-03-01 07:05");
        let json = serde_json::to_string(&stamp).unwrap();
        assert_eq!(json, "\"2024-03-01 07:05\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stamp);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-02-01").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
        );
        assert!(parse_date("2024-02-30").is_err());
    }

    #[test]
    fn test_month_key_parse_and_display() {
        let month: MonthKey = "2024-3".parse().unwrap();
        assert_eq!(month.to_string(), "2024-03");
        assert_eq!(month.label(), "2024년 3월");
        assert!("2024-13".parse::<MonthKey>().is_err());
        assert!("202403".parse::<MonthKey>().is_err());
    }

    #[test]
    fn test_month_key_previous_wraps_year() {
        let january = MonthKey::new(2024, 1).unwrap();
        assert_eq!(january.previous(), MonthKey::new(2023, 12).unwrap());
    }

    #[test]
    fn test_month_key_recent() {
        let months = MonthKey::new(2024, 2).unwrap().recent(12);
        assert_eq!(months.len(), 12);
        assert_eq!(months[0].to_string(), "2024-02");
        assert_eq!(months[1].to_string(), "2024-01");
        assert_eq!(months[2].to_string(), "2023-12");
        assert_eq!(months[11].to_string(), "2023-03");
    }

    #[test]
    fn test_month_key_contains() {
        let month = MonthKey::new(2024, 1).unwrap();
        assert!(month.contains(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()));
        assert!(!month.contains(NaiveDate::from_ymd_opt(2023, 1, 31).unwrap()));
    }
}
