//! Ledger table
//!
//! Two string columns, `name` (primary key) and `timestamp` (ISO-8601 UTC
//! with millisecond precision). The shape is shared with other tools reading
//! the same live ledger, so it must not change.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info, warn};

use super::definitions::LedgerRecord;
use crate::backends::{DatabaseConnection, SqlDialect};
use crate::error::{OrmError, OrmResult};

/// Location of the ledger table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTable {
    table: String,
    schema: Option<String>,
}

impl Default for LedgerTable {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TABLE)
    }
}

impl LedgerTable {
    pub const DEFAULT_TABLE: &'static str = "migrations";

    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: None,
        }
    }

    /// Keep the ledger in a dedicated schema (not available on SQLite)
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    fn qualified(&self, dialect: SqlDialect) -> String {
        dialect.qualified_table(self.schema(), &self.table)
    }

    fn create_table_sql(&self, dialect: SqlDialect) -> String {
        format!(
            "CREATE TABLE {} ({} VARCHAR(255) NOT NULL PRIMARY KEY, {} VARCHAR(255) NOT NULL)",
            self.qualified(dialect),
            dialect.quote_identifier("name"),
            dialect.quote_identifier("timestamp"),
        )
    }

    pub async fn exists(&self, conn: &mut dyn DatabaseConnection) -> OrmResult<bool> {
        conn.table_exists(self.schema(), &self.table).await
    }

    /// Create the schema and table if missing.
    ///
    /// Losing a creation race to another process is fine: a failed CREATE is
    /// only reported if the object is still missing afterwards.
    pub async fn ensure(&self, conn: &mut dyn DatabaseConnection) -> OrmResult<()> {
        let dialect = conn.dialect();

        if let Some(schema) = self.schema() {
            if !dialect.supports_schemas() {
                return Err(OrmError::Configuration(format!(
                    "{} does not support schemas; cannot place the ledger in '{}'",
                    dialect, schema
                )));
            }
            if !conn.schema_exists(schema).await? {
                let sql = dialect.create_schema_sql(schema)?;
                if let Err(e) = conn.execute(&sql, &[]).await {
                    if !conn.schema_exists(schema).await? {
                        return Err(OrmError::Schema(format!(
                            "Failed to create ledger schema '{}': {}",
                            schema, e
                        )));
                    }
                    debug!(schema, "Ledger schema appeared concurrently");
                }
            }
        }

        if self.exists(conn).await? {
            return Ok(());
        }

        match conn.execute(&self.create_table_sql(dialect), &[]).await {
            Ok(_) => {
                info!(table = %self.table, "Created ledger table");
                Ok(())
            }
            Err(e) => {
                if self.exists(conn).await? {
                    warn!(table = %self.table, "Ledger table created concurrently: {}", e);
                    Ok(())
                } else {
                    Err(OrmError::Schema(format!(
                        "Failed to create ledger table '{}': {}",
                        self.table, e
                    )))
                }
            }
        }
    }

    /// All records, ordered by execution time and then name
    pub async fn records(&self, conn: &mut dyn DatabaseConnection) -> OrmResult<Vec<LedgerRecord>> {
        let dialect = conn.dialect();
        let name = dialect.quote_identifier("name");
        let timestamp = dialect.quote_identifier("timestamp");
        let sql = format!(
            "SELECT {name}, {timestamp} FROM {} ORDER BY {timestamp} ASC, {name} ASC",
            self.qualified(dialect),
        );

        let rows = conn.fetch_all(&sql, &[]).await?;
        rows.iter()
            .map(|row| -> OrmResult<LedgerRecord> {
                Ok(LedgerRecord {
                    name: row.get_string("name")?,
                    executed_at: row.get_string("timestamp")?,
                })
            })
            .collect()
    }

    /// Record a unit as applied. A duplicate name surfaces as
    /// [`OrmError::UniqueViolation`].
    pub async fn insert(
        &self,
        conn: &mut dyn DatabaseConnection,
        name: &str,
        executed_at: DateTime<Utc>,
    ) -> OrmResult<()> {
        let dialect = conn.dialect();
        let sql = format!(
            "INSERT INTO {} ({}, {}) VALUES ({}, {})",
            self.qualified(dialect),
            dialect.quote_identifier("name"),
            dialect.quote_identifier("timestamp"),
            dialect.parameter_placeholder(0),
            dialect.parameter_placeholder(1),
        );
        conn.execute(&sql, &[name.into(), format_timestamp(executed_at).into()])
            .await?;
        Ok(())
    }

    /// Forget a unit; returns the number of rows removed
    pub async fn remove(&self, conn: &mut dyn DatabaseConnection, name: &str) -> OrmResult<u64> {
        let dialect = conn.dialect();
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            self.qualified(dialect),
            dialect.quote_identifier("name"),
            dialect.parameter_placeholder(0),
        );
        conn.execute(&sql, &[name.into()]).await
    }
}

/// Ledger timestamp format: `2023-11-21T12:42:33.631Z`
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
