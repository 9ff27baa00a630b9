//! Sequencer error taxonomy

use thiserror::Error;

use super::definitions::Direction;
use crate::error::OrmError;

/// Errors raised while sequencing versioned units
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Duplicate unit names, unknown targets and similar setup mistakes
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The ledger disagrees with the provider; never repaired automatically
    #[error("Corrupted ledger: {0}")]
    LedgerCorruption(String),

    /// A unit's own procedure failed
    #[error("Unit '{unit}' failed during {direction}: {source}")]
    UnitExecution {
        unit: String,
        direction: Direction,
        source: anyhow::Error,
    },

    /// Lost a race on the ledger primary key to another run
    #[error("Unit '{0}' was already applied by a concurrent run")]
    AlreadyApplied(String),

    #[error(transparent)]
    Database(#[from] OrmError),
}

impl MigrationError {
    /// Whether the whole call may simply be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MigrationError::AlreadyApplied(_) | MigrationError::Database(OrmError::Connection(_))
        )
    }

    /// Name of the unit this error is about, when there is one
    pub fn unit(&self) -> Option<&str> {
        match self {
            MigrationError::UnitExecution { unit, .. } => Some(unit),
            MigrationError::AlreadyApplied(unit) => Some(unit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_execution_message_names_unit_and_direction() {
        let err = MigrationError::UnitExecution {
            unit: "2_posts".into(),
            direction: Direction::Up,
            source: anyhow::anyhow!("syntax error"),
        };
        assert_eq!(err.to_string(), "Unit '2_posts' failed during up: syntax error");
        assert_eq!(err.unit(), Some("2_posts"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_already_applied_is_retryable() {
        let err = MigrationError::AlreadyApplied("1_users".into());
        assert!(err.is_retryable());
        assert!(!MigrationError::LedgerCorruption("x".into()).is_retryable());
    }
}
