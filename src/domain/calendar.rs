//! Rebalance calendar.
//!
//! Turns a date index into rebalance flags. A flagged row's close-of-day
//! weight decision takes effect from the following row.

use crate::domain::error::AllocsimError;
use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RebalanceUnit {
    Day,
    Week,
    Month,
}

impl RebalanceUnit {
    /// Trading days in one unit; lookbacks given in units are scaled by this.
    pub fn trading_days(self) -> usize {
        match self {
            RebalanceUnit::Day => 1,
            RebalanceUnit::Week => 5,
            RebalanceUnit::Month => 21,
        }
    }

    fn period_key(self, date: NaiveDate) -> (i32, u32) {
        match self {
            RebalanceUnit::Day => (date.year(), date.ordinal()),
            RebalanceUnit::Week => {
                let week = date.iso_week();
                (week.year(), week.week())
            }
            RebalanceUnit::Month => (date.year(), date.month()),
        }
    }
}

impl FromStr for RebalanceUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "daily" => Ok(RebalanceUnit::Day),
            "week" | "weekly" => Ok(RebalanceUnit::Week),
            "month" | "monthly" => Ok(RebalanceUnit::Month),
            other => Err(format!(
                "unknown rebalance unit '{other}' (expected day, week or month)"
            )),
        }
    }
}

impl fmt::Display for RebalanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceUnit::Day => write!(f, "day"),
            RebalanceUnit::Week => write!(f, "week"),
            RebalanceUnit::Month => write!(f, "month"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarConfig {
    pub unit: RebalanceUnit,
    /// Rebalance on every Nth period boundary.
    pub frequency: usize,
    /// Rows between detecting a boundary and acting on it.
    pub shift: usize,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            unit: RebalanceUnit::Month,
            frequency: 1,
            shift: 0,
        }
    }
}

impl fmt::Display for CalendarConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "every {} {}(s), shift {}",
            self.frequency, self.unit, self.shift
        )
    }
}

/// Rows that close a period. The last row always does.
pub fn period_boundaries(dates: &[NaiveDate], unit: RebalanceUnit) -> Vec<bool> {
    if unit == RebalanceUnit::Day {
        return vec![true; dates.len()];
    }
    let mut boundaries: Vec<bool> = dates
        .windows(2)
        .map(|w| unit.period_key(w[0]) != unit.period_key(w[1]))
        .collect();
    if !dates.is_empty() {
        boundaries.push(true);
    }
    boundaries
}

/// Rebalance flags aligned 1:1 with `dates`. The first row is always flagged.
pub fn rebalance_flags(
    dates: &[NaiveDate],
    config: &CalendarConfig,
) -> Result<Vec<bool>, AllocsimError> {
    if config.frequency == 0 {
        return Err(AllocsimError::invalid(
            "calendar",
            "rebalance_freq",
            "must be a positive integer",
        ));
    }
    let n = dates.len();
    let boundaries = period_boundaries(dates, config.unit);

    let mut shifted = vec![false; n];
    for i in config.shift..n {
        shifted[i] = boundaries[i - config.shift];
    }
    if let Some(first) = shifted.first_mut() {
        *first = true;
    }

    let mut flags = vec![false; n];
    let mut period = 0usize;
    for i in 0..n {
        if i > 0 && shifted[i - 1] {
            period += 1;
        }
        flags[i] = shifted[i] && period % config.frequency == 0;
    }
    Ok(flags)
}
