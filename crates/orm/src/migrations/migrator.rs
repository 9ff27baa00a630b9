//! Migration Executor
//!
//! A [`Sequencer`] over schema units, tracked in the `migrations` ledger.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use super::definitions::{Direction, LedgerRecord, ResultSet, Step, Target};
use super::error::MigrationError;
use super::ledger::LedgerTable;
use super::sequencer::{Sequencer, SequencerConfig, SequencerState};
use super::unit::{UnitProvider, VersionedUnit};
use crate::backends::DatabaseConnection;
use crate::transaction::TransactionAdapter;

/// Schema migration runner
pub struct Migrator {
    sequencer: Sequencer<dyn VersionedUnit>,
}

impl Migrator {
    /// Migrator with the default `migrations` ledger
    pub fn new(provider: Arc<dyn UnitProvider<dyn VersionedUnit>>) -> Self {
        Self::with_config(provider, SequencerConfig::new(LedgerTable::default()))
    }

    pub fn with_config(
        provider: Arc<dyn UnitProvider<dyn VersionedUnit>>,
        config: SequencerConfig,
    ) -> Self {
        Self {
            sequencer: Sequencer::new(provider, config),
        }
    }

    pub fn with_adapter(mut self, adapter: TransactionAdapter) -> Self {
        self.sequencer = self.sequencer.with_adapter(adapter);
        self
    }

    pub fn sequencer(&self) -> &Sequencer<dyn VersionedUnit> {
        &self.sequencer
    }

    pub async fn state(
        &self,
        conn: &mut dyn DatabaseConnection,
    ) -> Result<SequencerState<dyn VersionedUnit>, MigrationError> {
        self.sequencer.state(conn).await
    }

    /// Applied migrations in execution order
    pub async fn executed(
        &self,
        conn: &mut dyn DatabaseConnection,
    ) -> Result<Vec<LedgerRecord>, MigrationError> {
        Ok(self.state(conn).await?.executed)
    }

    pub async fn apply(
        &self,
        conn: &mut dyn DatabaseConnection,
        direction: Direction,
        step: Step,
    ) -> Result<ResultSet, MigrationError> {
        self.sequencer.apply(conn, direction, step).await
    }

    pub async fn up(
        &self,
        conn: &mut dyn DatabaseConnection,
        step: Step,
    ) -> Result<ResultSet, MigrationError> {
        self.apply(conn, Direction::Up, step).await
    }

    pub async fn down(
        &self,
        conn: &mut dyn DatabaseConnection,
        step: Step,
    ) -> Result<ResultSet, MigrationError> {
        self.apply(conn, Direction::Down, step).await
    }

    pub async fn apply_to(
        &self,
        conn: &mut dyn DatabaseConnection,
        target: Target,
    ) -> Result<ResultSet, MigrationError> {
        self.sequencer.apply_to(conn, target).await
    }

    /// Operator-facing summary of applied and pending migrations
    pub async fn status(
        &self,
        conn: &mut dyn DatabaseConnection,
    ) -> Result<MigrationStatusReport, MigrationError> {
        let state = self.state(conn).await?;
        Ok(MigrationStatusReport::from_state(&state))
    }
}

/// One line of a [`MigrationStatusReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatusEntry {
    pub name: String,
    pub executed_at: Option<String>,
}

/// Total/applied/pending counts plus per-migration detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatusReport {
    pub total: usize,
    pub applied: usize,
    pub pending: usize,
    pub last_applied: Option<String>,
    pub entries: Vec<MigrationStatusEntry>,
}

impl MigrationStatusReport {
    pub fn from_state(state: &SequencerState<dyn VersionedUnit>) -> Self {
        let entries = state
            .all_units
            .iter()
            .map(|unit| MigrationStatusEntry {
                name: unit.name().to_string(),
                executed_at: state
                    .executed
                    .iter()
                    .find(|r| r.name == unit.name())
                    .map(|r| r.executed_at.clone()),
            })
            .collect();

        Self {
            total: state.all_units.len(),
            applied: state.executed.len(),
            pending: state.pending.len(),
            last_applied: state.last_executed_name().map(str::to_string),
            entries,
        }
    }
}

impl fmt::Display for MigrationStatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Migrations: {} total, {} applied, {} pending",
            self.total, self.applied, self.pending
        )?;
        if let Some(last) = &self.last_applied {
            writeln!(f, "Last applied: {}", last)?;
        }
        for entry in &self.entries {
            match &entry.executed_at {
                Some(at) => writeln!(f, "  [x] {}  ({})", entry.name, at)?,
                None => writeln!(f, "  [ ] {}", entry.name)?,
            }
        }
        Ok(())
    }
}
