use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;

use crate::date_util::format_timestamp;

pub const DEFAULT_DAYS: i64 = 30;
pub const MIN_DAYS: i64 = 1;
pub const MAX_DAYS: i64 = 365;

static RE_LEADING_INT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([+-]?)(\d+)").unwrap());

/// Clamp a window length into `[MIN_DAYS, MAX_DAYS]`.
pub fn clamp_days(days: i64) -> i64 {
    days.clamp(MIN_DAYS, MAX_DAYS)
}

/// Parse a caller-supplied `days` value.
///
/// Missing or non-numeric input yields [`DEFAULT_DAYS`]. A leading integer
/// is accepted even with trailing junk (`"14days"` is 14). The result is
/// always clamped, so this never fails.
pub fn parse_days(input: Option<&str>) -> i64 {
    let Some(caps) = input.and_then(|s| RE_LEADING_INT.captures(s)) else {
        return DEFAULT_DAYS;
    };
    let negative = &caps[1] == "-";
    // Digits only, so the sole failure is overflow.
    let magnitude = caps[2].parse::<i64>().unwrap_or(i64::MAX);
    clamp_days(if negative { -magnitude } else { magnitude })
}

/// A rolling window of `days` × 24h ending at `end`, bucketed by UTC
/// calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingWindow {
    pub days: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RollingWindow {
    /// Window ending at `now`. `days` is clamped first.
    pub fn ending_at(days: i64, now: DateTime<Utc>) -> Self {
        let days = clamp_days(days);
        Self {
            days,
            start: now - Duration::hours(days * 24),
            end: now,
        }
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end.date_naive()
    }

    pub fn start_key(&self) -> String {
        self.start_date().format("%Y-%m-%d").to_string()
    }

    pub fn end_key(&self) -> String {
        self.end_date().format("%Y-%m-%d").to_string()
    }

    /// Stored-format timestamp bounds, inclusive on both ends.
    pub fn timestamp_bounds(&self) -> (String, String) {
        (format_timestamp(self.start), format_timestamp(self.end))
    }

    /// Every calendar day from the start day through the end day, ascending.
    pub fn day_keys(&self) -> Vec<String> {
        self.start_date()
            .iter_days()
            .take_while(|d| *d <= self.end_date())
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect()
    }
}
