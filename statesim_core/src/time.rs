//! Simulated clock primitives.
//!
//! All simulated time is expressed as milliseconds since the Unix epoch.
//! Module definitions express durations as a quantity plus a unit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point on the simulated clock (milliseconds since the Unix epoch).
pub type Timestamp = i64;

pub const SECOND_MS: i64 = 1_000;
pub const MINUTE_MS: i64 = 60 * SECOND_MS;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
pub const DAY_MS: i64 = 24 * HOUR_MS;
pub const WEEK_MS: i64 = 7 * DAY_MS;
pub const MONTH_MS: i64 = 30 * DAY_MS;
pub const YEAR_MS: i64 = 365 * DAY_MS;

/// Returns `n` days as milliseconds.
pub fn days(n: i64) -> i64 {
    n * DAY_MS
}

/// Returns `n` years (of 365 days) as milliseconds.
pub fn years(n: i64) -> i64 {
    n * YEAR_MS
}

/// Unit attached to a duration in a module definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Years,
    Months,
    Weeks,
    Days,
    Hours,
    Minutes,
    Seconds,
    Milliseconds,
}

impl TimeUnit {
    /// Length of one unit in milliseconds.
    pub fn millis(self) -> i64 {
        match self {
            TimeUnit::Years => YEAR_MS,
            TimeUnit::Months => MONTH_MS,
            TimeUnit::Weeks => WEEK_MS,
            TimeUnit::Days => DAY_MS,
            TimeUnit::Hours => HOUR_MS,
            TimeUnit::Minutes => MINUTE_MS,
            TimeUnit::Seconds => SECOND_MS,
            TimeUnit::Milliseconds => 1,
        }
    }

    /// Converts a (possibly fractional) quantity of this unit to milliseconds.
    pub fn to_millis(self, quantity: f64) -> i64 {
        (quantity * self.millis() as f64).round() as i64
    }

    /// Converts milliseconds to a fractional quantity of this unit.
    pub fn from_millis(self, millis: i64) -> f64 {
        millis as f64 / self.millis() as f64
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeUnit::Years => "years",
            TimeUnit::Months => "months",
            TimeUnit::Weeks => "weeks",
            TimeUnit::Days => "days",
            TimeUnit::Hours => "hours",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Milliseconds => "milliseconds",
        };
        f.write_str(name)
    }
}

/// Renders a duration in the largest unit that fits, for human-readable reports.
///
/// The output is approximate ("1.25 years (About 1 years and 3 months)") and
/// is meant for reading, not parsing.
pub fn describe_duration(millis: f64) -> String {
    let secs = millis / 1000.0;
    let mins = secs / 60.0;
    let hours = mins / 60.0;
    let days = hours / 24.0;
    let weeks = days / 7.0;
    let months = days / 30.0;
    let years = days / 365.25;

    if years as i64 > 0 {
        format!(
            "{:.2} years (About {} years and {} months)",
            years,
            years as i64,
            months as i64 % 12
        )
    } else if months as i64 > 0 {
        format!(
            "{:.2} months (About {} months and {} days)",
            months,
            months as i64,
            days as i64 % 30
        )
    } else if weeks as i64 > 0 {
        format!(
            "{:.2} weeks (About {} weeks and {} days)",
            weeks,
            weeks as i64,
            days as i64 % 7
        )
    } else if days as i64 > 0 {
        format!(
            "{:.2} days (About {} days and {} hours)",
            days,
            days as i64,
            hours as i64 % 24
        )
    } else if hours as i64 > 0 {
        format!(
            "{:.2} hours (About {} hours and {} mins)",
            hours,
            hours as i64,
            mins as i64 % 60
        )
    } else if mins as i64 > 0 {
        format!(
            "{:.2} minutes (About {} minutes and {} seconds)",
            mins,
            mins as i64,
            secs as i64 % 60
        )
    } else if secs as i64 > 0 {
        format!("{:.1} seconds", secs)
    } else {
        "0".to_string()
    }
}
