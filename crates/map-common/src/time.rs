//! Time handling utilities for time-stepped map sources.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Parse an ISO 8601 timestamp, assuming UTC when no offset is given.
///
/// Accepts full RFC 3339, `YYYY-MM-DDTHH:MM:SS` and plain `YYYY-MM-DD`.
pub fn parse_iso8601(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(&format!("{}T00:00:00", s), "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(TimeParseError::InvalidFormat(s.to_string()))
}

/// An inclusive time range for date filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Parse a "start/end" range string.
    pub fn from_range_string(s: &str) -> Result<Self, TimeParseError> {
        let (start, end) = s
            .split_once('/')
            .ok_or_else(|| TimeParseError::InvalidFormat(s.to_string()))?;
        let range = Self::new(parse_iso8601(start)?, parse_iso8601(end)?);
        if range.end < range.start {
            return Err(TimeParseError::Reversed(s.to_string()));
        }
        Ok(range)
    }

    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        dt >= &self.start && dt <= &self.end
    }

    /// Subset of `times` falling inside this range, order preserved.
    pub fn filter(&self, times: &BTreeSet<DateTime<Utc>>) -> BTreeSet<DateTime<Utc>> {
        if self.end < self.start {
            return BTreeSet::new();
        }
        times.range(self.start..=self.end).copied().collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),

    #[error("Time range ends before it starts: {0}")]
    Reversed(String),
}
