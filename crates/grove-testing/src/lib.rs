//! # grove-testing - Test fixtures for grove
//!
//! Shared helpers for exercising the migration and seed engine against a
//! real (in-memory) SQLite database.
//!
//! ```rust,no_run
//! use grove_testing::prelude::*;
//!
//! # async fn demo() -> TestResult<()> {
//! let mut db = TestDatabase::new().await?;
//! let log = CallLog::new();
//! let migrator = Migrator::new(provider(scripted(&["1_a", "2_b"], &log)));
//! migrator.up(db.conn(), Step::All).await?;
//! assert_eq!(log.entries(), vec!["up:1_a", "up:2_b"]);
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod units;

// Re-export commonly used types
pub use database::{NonTransactional, TestDatabase};
pub use units::{provider, scripted, table_for, CallLog, ScriptedMigration};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        database::{NonTransactional, TestDatabase},
        init_test_tracing,
        units::{provider, scripted, table_for, CallLog, ScriptedMigration},
        TestError, TestResult,
    };

    pub use grove_orm::{
        Direction, LedgerTable, MigrationError, Migrator, SequencerConfig, Step, Target,
        UnitStatus,
    };
}

// Error handling
#[derive(thiserror::Error, Debug)]
pub enum TestError {
    #[error("Database error: {0}")]
    Database(#[from] grove_orm::OrmError),

    #[error("Migration error: {0}")]
    Migration(#[from] grove_orm::MigrationError),

    #[error("Assertion failed: {message}")]
    Assertion { message: String },

    #[error("Test setup error: {0}")]
    Setup(String),
}

pub type TestResult<T> = Result<T, TestError>;

/// Route engine logs to the test harness; safe to call from every test
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_log_is_shared() {
        let log = CallLog::new();
        let other = log.clone();
        log.record("up:1_a");
        other.record("up:2_b");
        assert_eq!(log.entries(), vec!["up:1_a", "up:2_b"]);
        log.clear();
        assert!(other.is_empty());
    }

    #[test]
    fn test_table_for() {
        assert_eq!(table_for("1700570553631_users"), "t_1700570553631_users");
        assert_eq!(table_for("2-b"), "t_2_b");
    }

    #[tokio::test]
    async fn test_count_records() {
        let mut db = TestDatabase::new().await.unwrap();
        db.execute("CREATE TABLE things (id INTEGER)").await.unwrap();
        db.execute("INSERT INTO things (id) VALUES (1), (2)")
            .await
            .unwrap();
        assert_eq!(db.count_records("things").await.unwrap(), 2);
        assert!(db.table_exists("things").await.unwrap());
    }
}
