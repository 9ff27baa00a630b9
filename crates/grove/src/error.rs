//! Error types for the orchestration layer

use grove_core::ConfigError;
use grove_kv::KvError;
use grove_orm::{MigrationError, OrmError, ResultSet};
use grove_storage::StorageError;
use thiserror::Error;

use crate::driver::Workflow;
use crate::seeding::SeedPhase;

/// Failure of a Reconciler call. The whole call is idempotent, so
/// retryable failures may be retried as a unit.
#[derive(Debug, Error)]
pub enum ExternalStoreError {
    #[error("Blob store '{bucket}' failed: {source}")]
    Blob {
        bucket: String,
        #[source]
        source: StorageError,
    },

    #[error("Key-value table '{table}' failed: {source}")]
    KeyValue {
        table: String,
        #[source]
        source: KvError,
    },
}

impl ExternalStoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ExternalStoreError::Blob { source, .. } => matches!(
                source,
                StorageError::Network(_) | StorageError::Io(_) | StorageError::Backend(_)
            ),
            ExternalStoreError::KeyValue { source, .. } => matches!(
                source,
                KvError::Network(_) | KvError::Backend(_) | KvError::Unprocessed { .. }
            ),
        }
    }
}

/// Errors surfaced by seeding and the orchestration workflows
#[derive(Debug, Error)]
pub enum GroveError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Fatal before any unit ran: corruption, unknown target, ledger I/O
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// A migration unit failed inside a workflow; `results` holds the partial progress
    #[error("{workflow} aborted: {}", step_failure(.results))]
    MigrationStep {
        workflow: Workflow,
        results: ResultSet,
    },

    #[error("Seed unit '{unit}' failed during {phase}: {source}")]
    Seed {
        unit: String,
        phase: SeedPhase,
        source: anyhow::Error,
    },

    #[error(transparent)]
    ExternalStore(#[from] ExternalStoreError),

    #[error(transparent)]
    Database(#[from] OrmError),

    #[error("{workflow} refused in {environment}; set allow_destructive_in_production to override")]
    EnvironmentGuard {
        workflow: Workflow,
        environment: grove_core::Environment,
    },
}

fn step_failure(results: &ResultSet) -> String {
    match &results.error {
        Some(error) if results.rolled_back => format!("{} (rolled back)", error),
        Some(error) => error.to_string(),
        None => "unknown failure".to_string(),
    }
}

impl GroveError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GroveError::Migration(e) => e.is_retryable(),
            GroveError::MigrationStep { results, .. } => {
                results.error.as_ref().is_some_and(MigrationError::is_retryable)
            }
            GroveError::ExternalStore(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Name of the failing unit, for migration and seed failures
    pub fn unit(&self) -> Option<&str> {
        match self {
            GroveError::MigrationStep { results, .. } => results.failed_unit(),
            GroveError::Seed { unit, .. } => Some(unit),
            GroveError::Migration(e) => e.unit(),
            _ => None,
        }
    }
}

/// Result type for orchestration operations
pub type GroveResult<T> = Result<T, GroveError>;

#[cfg(test)]
mod tests {
    use super::*;
    use grove_orm::{Direction, UnitResult, UnitStatus};

    #[test]
    fn test_migration_step_message_names_unit_and_direction() {
        let results = ResultSet {
            direction: Direction::Down,
            results: vec![UnitResult::new("2_posts", Direction::Down, UnitStatus::Error)],
            error: Some(MigrationError::UnitExecution {
                unit: "2_posts".into(),
                direction: Direction::Down,
                source: anyhow::anyhow!("table is locked"),
            }),
            rolled_back: true,
        };
        let err = GroveError::MigrationStep {
            workflow: Workflow::Reset,
            results,
        };

        assert_eq!(
            err.to_string(),
            "reset aborted: Unit '2_posts' failed during down: table is locked (rolled back)"
        );
        assert_eq!(err.unit(), Some("2_posts"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_seed_error_names_phase() {
        let err = GroveError::Seed {
            unit: "1_users".into(),
            phase: SeedPhase::HabitatUp,
            source: anyhow::anyhow!("bucket unavailable"),
        };
        assert_eq!(
            err.to_string(),
            "Seed unit '1_users' failed during habitat.up: bucket unavailable"
        );
    }

    #[test]
    fn test_external_store_retryability() {
        let network = ExternalStoreError::Blob {
            bucket: "assets".into(),
            source: StorageError::Network("timeout".into()),
        };
        let invalid = ExternalStoreError::KeyValue {
            table: "sessions".into(),
            source: KvError::InvalidKey("".into()),
        };
        assert!(network.is_retryable());
        assert!(!invalid.is_retryable());
        assert!(GroveError::from(network).is_retryable());
    }
}
