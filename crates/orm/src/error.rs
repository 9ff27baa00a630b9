//! Error types for the datastore layer
//!
//! Every adapter maps driver failures into [`OrmError`] so the sequencer can
//! reason about them without knowing which engine it is talking to.

use std::fmt;

/// ORM result type alias
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for datastore operations
#[derive(Debug, Clone)]
pub enum OrmError {
    /// Database connection or query error
    Database(String),
    /// A unique or primary-key constraint rejected a write
    UniqueViolation(String),
    /// Connection error
    Connection(String),
    /// Transaction control error
    Transaction(String),
    /// Query building or execution error
    Query(String),
    /// Schema introspection or DDL error
    Schema(String),
    /// Column decoding error
    Serialization(String),
    /// Configuration error
    Configuration(String),
}

impl OrmError {
    /// Whether this error is a unique/primary-key violation
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, OrmError::UniqueViolation(_))
    }
}

impl fmt::Display for OrmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrmError::Database(msg) => write!(f, "Database error: {}", msg),
            OrmError::UniqueViolation(msg) => write!(f, "Unique constraint violated: {}", msg),
            OrmError::Connection(msg) => write!(f, "Connection error: {}", msg),
            OrmError::Transaction(msg) => write!(f, "Transaction error: {}", msg),
            OrmError::Query(msg) => write!(f, "Query error: {}", msg),
            OrmError::Schema(msg) => write!(f, "Schema error: {}", msg),
            OrmError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            OrmError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for OrmError {}

// Convert from sqlx errors
impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                OrmError::UniqueViolation(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                OrmError::Connection(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                OrmError::Serialization(err.to_string())
            }
            _ => OrmError::Database(err.to_string()),
        }
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        OrmError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_detection() {
        assert!(OrmError::UniqueViolation("dup".into()).is_unique_violation());
        assert!(!OrmError::Database("boom".into()).is_unique_violation());
    }

    #[test]
    fn test_display_prefixes() {
        assert_eq!(
            OrmError::Schema("no such table".into()).to_string(),
            "Schema error: no such table"
        );
        assert_eq!(
            OrmError::Transaction("already committed".into()).to_string(),
            "Transaction error: already committed"
        );
    }
}
