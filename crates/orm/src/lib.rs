//! # grove-orm: datastore layer for grove
//!
//! Connection adapters over caller-owned sqlx handles, the transaction
//! adapter, and the ledger-backed migration sequencer.

pub mod backends;
pub mod error;
pub mod migrations;
pub mod transaction;

// Re-export core traits and types
pub use backends::{
    DatabaseConnection, DatabaseRow, DatabaseValue, PostgresConnection, SqlDialect,
    SqliteConnection, ValueRow,
};
pub use error::*;
pub use migrations::*;
pub use transaction::*;
