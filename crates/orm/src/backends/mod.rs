//! Database Backend Abstractions
//!
//! Connection adapters over caller-owned sqlx handles. The sequencer only
//! ever sees [`DatabaseConnection`], so engines can be swapped or wrapped
//! (for instance to force non-transactional execution in tests).

pub mod core;
pub mod postgres;
pub mod sqlite;

// Re-export core traits and types
pub use core::*;
pub use postgres::PostgresConnection;
pub use sqlite::SqliteConnection;

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlDialect::PostgreSQL => write!(f, "postgresql"),
            SqlDialect::MySQL => write!(f, "mysql"),
            SqlDialect::SQLite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for SqlDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(SqlDialect::PostgreSQL),
            "mysql" => Ok(SqlDialect::MySQL),
            "sqlite" => Ok(SqlDialect::SQLite),
            _ => Err(format!("Unsupported database backend: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_parsing() {
        assert_eq!("postgres".parse::<SqlDialect>().unwrap(), SqlDialect::PostgreSQL);
        assert_eq!("SQLite".parse::<SqlDialect>().unwrap(), SqlDialect::SQLite);
        assert!("oracle".parse::<SqlDialect>().is_err());
        assert_eq!(SqlDialect::MySQL.to_string(), "mysql");
    }
}
