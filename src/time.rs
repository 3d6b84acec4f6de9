//! Date window and duration helpers shared by the aggregator and the exporters.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::fmt;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Fraction of calendar days that are working days (245 / 365).
const BUSINESS_DAY_RATIO: f64 = 0.67;

/// Windows up to this many days are assumed to be all working days.
const SHORT_WINDOW_DAYS: i64 = 5;

/// Default length of the window when no explicit bounds are configured.
pub const DEFAULT_WINDOW_DAYS: i64 = 14;

/// The `[from, to]` date range a report covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DeploymentWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DeploymentWindow {
    /// Returns `None` when `from` is after `to`.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    pub fn total_days(&self) -> i64 {
        (self.to - self.from).num_days()
    }

    /// Range in GitHub search qualifier syntax, e.g. `2024-01-01..2024-01-15`.
    pub fn search_range(&self) -> String {
        format!("{}..{}", self.from, self.to)
    }
}

impl fmt::Display for DeploymentWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.from, self.to)
    }
}

pub fn seconds_to_days(seconds: f64) -> f64 {
    seconds / SECONDS_PER_DAY
}

/// Fractional days in a chrono duration, at millisecond precision.
pub fn duration_to_days(duration: Duration) -> f64 {
    seconds_to_days(duration.num_milliseconds() as f64 / 1000.0)
}

/// Rough number of working days in the window.
///
/// Spans longer than five days are scaled by 0.67; shorter spans count every
/// calendar day.
pub fn business_days(window: &DeploymentWindow) -> u32 {
    let total_days = window.total_days();
    let days = if total_days > SHORT_WINDOW_DAYS {
        (total_days as f64 * BUSINESS_DAY_RATIO).floor()
    } else {
        total_days as f64
    };
    days.max(0.0) as u32
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn window(days: i64) -> DeploymentWindow {
        let from = date(2024, 1, 1);
        DeploymentWindow::new(from, from + Duration::days(days)).unwrap()
    }

    #[test]
    fn test_business_days_short_window_is_unscaled() {
        assert_eq!(business_days(&window(3)), 3);
        assert_eq!(business_days(&window(5)), 5);
    }

    #[test]
    fn test_business_days_long_window_is_scaled() {
        assert_eq!(business_days(&window(30)), 20);
        assert_eq!(business_days(&window(14)), 9);
        assert_eq!(business_days(&window(6)), 4);
    }

    #[test]
    fn test_business_days_empty_window() {
        assert_eq!(business_days(&window(0)), 0);
    }

    #[test]
    fn test_window_range_and_display() {
        let w = DeploymentWindow::new(date(2024, 3, 1), date(2024, 3, 15)).unwrap();
        assert_eq!(w.total_days(), 14);
        assert_eq!(w.search_range(), "2024-03-01..2024-03-15");
        assert_eq!(w.to_string(), "2024-03-01 to 2024-03-15");
    }

    #[test]
    fn test_reversed_window_is_rejected() {
        assert!(DeploymentWindow::new(date(2024, 2, 1), date(2024, 1, 1)).is_none());
    }

    #[test]
    fn test_seconds_to_days() {
        assert_eq!(seconds_to_days(86_400.0), 1.0);
        assert_eq!(seconds_to_days(5_400.0), 0.0625);
        assert_eq!(duration_to_days(Duration::hours(36)), 1.5);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round3(3.0625), 3.063);
        assert_eq!(round3(0.1234), 0.123);
        assert_eq!(round1(2.46), 2.5);
    }
}
