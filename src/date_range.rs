use std::fmt;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

// @module: Date range identifying one batch of reviews

/// Length of the window produced when continuing from the summary file
pub const WEEK_DAYS: i64 = 7;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive range of review submission dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    // @creates: Range, rejecting end < start
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ConfigError> {
        if end < start {
            return Err(ConfigError::InvertedRange {
                start: start.format(DATE_FORMAT).to_string(),
                end: end.format(DATE_FORMAT).to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse a range from two `YYYY-MM-DD` strings
    pub fn parse(start: &str, end: &str) -> Result<Self, ConfigError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    /// Week following the one that starts at `previous_start`.
    ///
    /// Always seven days long, regardless of how long the previous range was.
    pub fn week_after(previous_start: NaiveDate) -> Self {
        let start = previous_start + Duration::days(WEEK_DAYS);
        Self {
            start,
            end: start + Duration::days(WEEK_DAYS - 1),
        }
    }

    // @returns: Whether the date lies inside the range (inclusive)
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn start_str(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }

    /// Literal key used for cache directories and output names
    pub fn key(&self) -> String {
        format!("{}-to-{}", self.start_str(), self.end_str())
    }

    /// Name of the per-week detail file
    pub fn detail_file_name(&self) -> String {
        format!("results-{}.json", self.key())
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.start_str(), self.end_str())
    }
}

/// Parse a single `YYYY-MM-DD` date
pub fn parse_date(value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| ConfigError::InvalidDate {
        value: value.to_string(),
    })
}
