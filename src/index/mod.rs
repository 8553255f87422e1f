//! Index identifiers, time windows and resolution stepping
//!
//! An [`IndexIdentifier`] is produced by formatting a repository-naming
//! pattern such as `logs-%Y/logs-%Y-%m-%d/logs-v1-%Y-%m-%d` with a point in
//! time. [`TimeRangeIndexer`] walks a [`TimeWindow`] at a [`Resolution`] and
//! yields the identifiers that window implies.

mod range;

pub use range::{expand, TimeRangeIndexer, MAX_INDICES_PER_WINDOW};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while interpreting request input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Pre-epoch bound or `start >= end`
    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    /// Resolution other than day, month or year
    #[error("Invalid index resolution: {0}")]
    InvalidResolution(String),

    /// Pattern with a strftime directive chrono cannot format
    #[error("Invalid repository pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// Pattern as supplied
        pattern: String,
        /// What is wrong with it
        reason: String,
    },

    /// Formatted value lacks a repository path or index name
    #[error("Malformed index identifier '{0}': expected repository/snapshot/index")]
    MalformedIdentifier(String),

    /// Window would expand into more identifiers than one request may carry
    #[error("Time window spans more than {max} {resolution} indices")]
    WindowTooLarge {
        /// Resolution the window was walked at
        resolution: Resolution,
        /// Largest accepted identifier count
        max: usize,
    },
}

/// Identifier of one index at one point in the partition calendar.
///
/// Formatted as `repository/snapshot/index`. Everything before the last `/`
/// addresses the snapshot in the repository API, the last segment is the
/// bare index name as it appears on the live cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IndexIdentifier(String);

impl IndexIdentifier {
    /// Parse an identifier, requiring a non-empty repository path and index name
    pub fn new(value: impl Into<String>) -> Result<Self, IndexError> {
        let value = value.into();
        match value.rsplit_once('/') {
            Some((dir, base))
                if !base.is_empty() && !dir.is_empty() && dir.split('/').all(|s| !s.is_empty()) =>
            {
                Ok(Self(value))
            }
            _ => Err(IndexError::MalformedIdentifier(value)),
        }
    }

    /// Full `repository/snapshot/index` form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segment used against the snapshot API (`repository/snapshot`)
    pub fn repository_path(&self) -> &str {
        self.0.rsplit_once('/').map(|(dir, _)| dir).unwrap_or_default()
    }

    /// Bare index name as listed by the live cluster
    pub fn index_name(&self) -> &str {
        self.0
            .rsplit_once('/')
            .map(|(_, base)| base)
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for IndexIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for IndexIdentifier {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for IndexIdentifier {
    type Error = IndexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<IndexIdentifier> for String {
    fn from(id: IndexIdentifier) -> Self {
        id.0
    }
}

/// Discretization step used to walk a window into identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// One index per calendar day
    #[default]
    Day,
    /// One index per calendar month
    Month,
    /// One index per calendar year
    Year,
}

impl Resolution {
    /// Lowercase name accepted by the parser
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Day => "day",
            Resolution::Month => "month",
            Resolution::Year => "year",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Resolution::Day),
            "month" => Ok(Resolution::Month),
            "year" => Ok(Resolution::Year),
            _ => Err(IndexError::InvalidResolution(s.to_string())),
        }
    }
}

/// Half-open UTC interval `[start, end)` requested by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// Build a window, rejecting pre-epoch bounds and `start >= end`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, IndexError> {
        if start.timestamp() < 0 {
            return Err(IndexError::InvalidTimeRange(
                "Start time must be greater than 0".to_string(),
            ));
        }
        if end.timestamp() < 0 {
            return Err(IndexError::InvalidTimeRange(
                "End time must be greater than 0".to_string(),
            ));
        }
        if start >= end {
            return Err(IndexError::InvalidTimeRange(
                "Start time must be less than end time".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    /// Build a window from epoch seconds as received on the wire
    pub fn from_epoch_secs(start: i64, end: i64) -> Result<Self, IndexError> {
        let start = epoch_to_utc(start, "Start")?;
        let end = epoch_to_utc(end, "End")?;
        Self::new(start, end)
    }

    /// Inclusive lower bound
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive upper bound
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}]",
            self.start.format("%Y-%m-%d %H:%M:%S UTC"),
            self.end.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

fn epoch_to_utc(secs: i64, label: &str) -> Result<DateTime<Utc>, IndexError> {
    if secs < 0 {
        return Err(IndexError::InvalidTimeRange(format!(
            "{label} time must be greater than 0"
        )));
    }
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| IndexError::InvalidTimeRange(format!("{label} time is out of range")))
}
