//! Migration Definitions - Core types shared by the sequencer and its callers
//!
//! Directions, step counts, targets, per-unit results and the ledger row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::MigrationError;

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// How many units a single apply call should process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// At most this many units; `Count(0)` is a no-op
    Count(usize),
    /// Every candidate unit
    All,
}

impl Step {
    /// Number of units to take out of `available` candidates
    pub fn limit(&self, available: usize) -> usize {
        match self {
            Step::Count(n) => (*n).min(available),
            Step::All => available,
        }
    }
}

impl From<usize> for Step {
    fn from(count: usize) -> Self {
        Step::Count(count)
    }
}

/// Named destination for [`apply_to`](super::Sequencer::apply_to)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Leave exactly this unit as the last executed one
    Unit(String),
    /// Remove everything
    Zero,
}

impl Target {
    pub fn unit(name: impl Into<String>) -> Self {
        Target::Unit(name.into())
    }
}

/// Per-unit outcome within a [`ResultSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitStatus {
    Success,
    Error,
    NotExecuted,
}

/// One selected unit and what happened to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitResult {
    pub name: String,
    pub direction: Direction,
    pub status: UnitStatus,
}

impl UnitResult {
    pub fn new(name: impl Into<String>, direction: Direction, status: UnitStatus) -> Self {
        Self {
            name: name.into(),
            direction,
            status,
        }
    }
}

/// Result of an apply call.
///
/// Unit failures never escape the sequencer as an `Err`; they land in
/// `error` with the offending unit marked [`UnitStatus::Error`] and the
/// units after it marked [`UnitStatus::NotExecuted`].
#[derive(Debug)]
pub struct ResultSet {
    pub direction: Direction,
    pub results: Vec<UnitResult>,
    pub error: Option<MigrationError>,
    /// The batch ran atomically and was rolled back, so the ledger reflects none of it
    pub rolled_back: bool,
}

impl ResultSet {
    /// Nothing selected, nothing done
    pub fn empty(direction: Direction) -> Self {
        Self {
            direction,
            results: Vec::new(),
            error: None,
            rolled_back: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Names of units whose procedure and ledger write both succeeded
    pub fn succeeded(&self) -> Vec<&str> {
        self.names_with(UnitStatus::Success)
    }

    pub fn not_executed(&self) -> Vec<&str> {
        self.names_with(UnitStatus::NotExecuted)
    }

    /// The unit that stopped the batch, if any
    pub fn failed_unit(&self) -> Option<&str> {
        self.results
            .iter()
            .find(|r| r.status == UnitStatus::Error)
            .map(|r| r.name.as_str())
    }

    /// Give up the result set, turning a captured failure into an `Err`
    pub fn into_result(self) -> Result<Vec<UnitResult>, MigrationError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.results),
        }
    }

    fn names_with(&self, status: UnitStatus) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.name.as_str())
            .collect()
    }
}

/// A ledger row: one per applied unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub name: String,
    /// ISO-8601 UTC string exactly as stored
    pub executed_at: String,
}

impl LedgerRecord {
    pub fn executed_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.executed_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}
