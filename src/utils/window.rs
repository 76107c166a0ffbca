//! Time windows: `N-unit`, `YYYY-MM-DD`, `YYYY-MM-DD-HH:MM:SS`, or no bound.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Result, TrackerError};

/// Canonical cursor format, local time
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static RELATIVE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)?)-(hour|day|week|month|year)$").unwrap());
static DATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").unwrap());
static DATETIME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})-(\d{2}:\d{2}:\d{2})$").unwrap());

/// Parse a window expression into a non-negative duration
///
/// Absolute dates are measured against `reference` in either direction.
pub fn parse(spec: &str, reference: NaiveDateTime) -> Result<Duration> {
    let spec = spec.trim();
    let invalid = || TrackerError::InvalidSpec(spec.to_string());

    if let Some(caps) = RELATIVE_REGEX.captures(spec) {
        let amount: f64 = caps[1].parse().map_err(|_| invalid())?;
        let unit_secs: f64 = match &caps[2] {
            "hour" => 3_600.0,
            "day" => 86_400.0,
            "week" => 7.0 * 86_400.0,
            "month" => 30.0 * 86_400.0,
            "year" => 365.0 * 86_400.0,
            _ => return Err(invalid()),
        };
        let millis = (amount * unit_secs * 1000.0).round();
        if !millis.is_finite() || millis > i64::MAX as f64 {
            return Err(invalid());
        }
        return Duration::try_milliseconds(millis as i64).ok_or_else(invalid);
    }

    if let Some(caps) = DATE_REGEX.captures(spec) {
        let year: i32 = caps[1].parse().map_err(|_| invalid())?;
        let month: u32 = caps[2].parse().map_err(|_| invalid())?;
        let day: u32 = caps[3].parse().map_err(|_| invalid())?;
        let midnight = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(invalid)?;
        return Ok((reference - midnight).abs());
    }

    if let Some(caps) = DATETIME_REGEX.captures(spec) {
        let instant = parse_timestamp(&format!("{} {}", &caps[1], &caps[2])).ok_or_else(invalid)?;
        return Ok((reference - instant).abs());
    }

    Err(invalid())
}

/// How far back a lookup reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// No bound (`-all`)
    All,
    Within(Duration),
}

impl Window {
    /// Parse a window expression; `all` / `-all` select [`Window::All`]
    pub fn from_spec(spec: &str, reference: NaiveDateTime) -> Result<Self> {
        match spec.trim() {
            "all" | "-all" => Ok(Window::All),
            other => parse(other, reference).map(Window::Within),
        }
    }

    /// Whether something `age` old is still inside the window
    pub fn admits(&self, age: Duration) -> bool {
        match self {
            Window::All => true,
            Window::Within(limit) => age < *limit,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Window::All)
    }
}

pub fn format_timestamp(t: NaiveDateTime) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_relative_units() {
        let t = at("2024-01-04 00:00:00");
        assert_eq!(parse("3-hour", t).unwrap(), Duration::hours(3));
        assert_eq!(parse("2-day", t).unwrap(), Duration::days(2));
        assert_eq!(parse("1-week", t).unwrap(), Duration::days(7));
        assert_eq!(parse("1-month", t).unwrap(), Duration::days(30));
        assert_eq!(parse("2-year", t).unwrap(), Duration::days(730));
    }

    #[test]
    fn test_decimal_amount() {
        let t = at("2024-01-04 00:00:00");
        assert_eq!(parse("1.5-day", t).unwrap(), Duration::hours(36));
        assert_eq!(parse("0.5-hour", t).unwrap(), Duration::minutes(30));
    }

    #[test]
    fn test_monotonic_in_amount() {
        let t = at("2024-01-04 00:00:00");
        assert!(parse("2-day", t).unwrap() < parse("3-day", t).unwrap());
        assert!(parse("23-hour", t).unwrap() < parse("1-day", t).unwrap());
    }

    #[test]
    fn test_absolute_date_round_trip() {
        let t = at("2024-01-04 12:30:00");
        let midnight = at("2021-01-01 00:00:00");
        assert_eq!(parse("2021-01-01", t).unwrap(), (t - midnight).abs());
    }

    #[test]
    fn test_absolute_dates_in_the_future_are_absolute() {
        let t = at("2024-01-04 00:00:00");
        assert_eq!(parse("2024-01-06", t).unwrap(), Duration::days(2));
        assert_eq!(
            parse("2024-01-03-23:00:00", t).unwrap(),
            Duration::hours(1)
        );
    }

    #[test]
    fn test_rejects_other_forms() {
        let t = at("2024-01-04 00:00:00");
        for spec in [
            "", "2", "day", "2-days", "2 day", "-2-day", "2-fortnight", "2024-13-01",
            "2024-02-30", "2024-01-01 10:00:00", "2024-01-01-25:00:00", "1e9-day",
        ] {
            assert!(
                matches!(parse(spec, t), Err(TrackerError::InvalidSpec(_))),
                "accepted {:?}",
                spec
            );
        }
    }

    #[test]
    fn test_huge_amount_is_invalid_not_a_panic() {
        let t = at("2024-01-04 00:00:00");
        assert!(parse("99999999999999999999-year", t).is_err());
    }

    #[test]
    fn test_window_from_spec() {
        let t = at("2024-01-04 00:00:00");
        assert_eq!(Window::from_spec("-all", t).unwrap(), Window::All);
        assert_eq!(
            Window::from_spec("2-week", t).unwrap(),
            Window::Within(Duration::weeks(2))
        );

        let w = Window::Within(Duration::days(3));
        assert!(w.admits(Duration::days(2)));
        assert!(!w.admits(Duration::days(3)));
        assert!(Window::All.admits(Duration::days(10_000)));
    }

    #[test]
    fn test_timestamp_format() {
        let t = at("2024-01-03 09:05:00");
        assert_eq!(format_timestamp(t), "2024-01-03 09:05:00");
        assert!(parse_timestamp("2024-01-03T09:05:00").is_none());
    }
}
