//! Migration System
//!
//! Ledger-backed sequencing of versioned units. The [`Sequencer`] is generic
//! over the unit type; [`Migrator`] is its schema-migration specialization.

pub mod definitions;
pub mod error;
pub mod ledger;
pub mod migrator;
pub mod naming;
pub mod sequencer;
pub mod sql_files;
pub mod unit;

pub use definitions::*;
pub use error::MigrationError;
pub use ledger::{format_timestamp, LedgerTable};
pub use migrator::{MigrationStatusEntry, MigrationStatusReport, Migrator};
pub use naming::{compare_numeric_prefix, has_mixed_prefix_widths, numeric_prefix};
pub use sequencer::{Sequencer, SequencerConfig, SequencerState};
pub use sql_files::{split_sql_statements, SqlDirectoryProvider, SqlMigration};
pub use unit::{StaticProvider, UnitProvider, VersionedUnit};
