//! Core Database Backend Traits
//!
//! This module defines the connection abstraction the migration engine runs
//! against. Callers own the underlying driver handles; the engine only
//! borrows them through [`DatabaseConnection`] for the duration of a run.

use crate::error::{OrmError, OrmResult};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Abstract database connection trait
#[async_trait]
pub trait DatabaseConnection: Send {
    /// SQL dialect spoken by this connection
    fn dialect(&self) -> SqlDialect;

    /// Whether schema changes (DDL) can be rolled back inside a transaction
    fn supports_transactional_ddl(&self) -> bool {
        self.dialect().supports_transactional_ddl()
    }

    /// Execute a statement and return affected rows count
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64>;

    /// Execute a query and return the result rows
    async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> OrmResult<Vec<Box<dyn DatabaseRow>>>;

    /// Execute a query and return the first result row
    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> OrmResult<Option<Box<dyn DatabaseRow>>> {
        Ok(self.fetch_all(sql, params).await?.into_iter().next())
    }

    /// Begin a transaction
    async fn begin(&mut self) -> OrmResult<()> {
        self.execute("BEGIN", &[])
            .await
            .map_err(|e| OrmError::Transaction(format!("Failed to begin transaction: {}", e)))?;
        Ok(())
    }

    /// Commit the open transaction
    async fn commit(&mut self) -> OrmResult<()> {
        self.execute("COMMIT", &[])
            .await
            .map_err(|e| OrmError::Transaction(format!("Failed to commit transaction: {}", e)))?;
        Ok(())
    }

    /// Roll back the open transaction
    async fn rollback(&mut self) -> OrmResult<()> {
        self.execute("ROLLBACK", &[])
            .await
            .map_err(|e| OrmError::Transaction(format!("Failed to roll back transaction: {}", e)))?;
        Ok(())
    }

    /// Check whether a table exists, optionally inside a named schema
    async fn table_exists(&mut self, schema: Option<&str>, table: &str) -> OrmResult<bool> {
        let dialect = self.dialect();
        let (sql, params) = dialect.table_exists_query(schema, table)?;
        Ok(self.fetch_optional(&sql, &params).await?.is_some())
    }

    /// Check whether a schema (namespace) exists
    async fn schema_exists(&mut self, schema: &str) -> OrmResult<bool> {
        let dialect = self.dialect();
        let (sql, params) = dialect.schema_exists_query(schema)?;
        Ok(self.fetch_optional(&sql, &params).await?.is_some())
    }
}

/// Abstract database row trait
pub trait DatabaseRow: Send + Sync {
    /// Get a column value by index
    fn get_by_index(&self, index: usize) -> OrmResult<DatabaseValue>;

    /// Get a column value by name
    fn get_by_name(&self, name: &str) -> OrmResult<DatabaseValue>;

    /// Get column count
    fn column_count(&self) -> usize;

    /// Get column names
    fn column_names(&self) -> Vec<String>;

    /// Convert row to HashMap
    fn to_map(&self) -> OrmResult<HashMap<String, DatabaseValue>> {
        let mut map = HashMap::new();
        for (i, name) in self.column_names().into_iter().enumerate() {
            map.insert(name, self.get_by_index(i)?);
        }
        Ok(map)
    }

    /// Get a text column, failing if it is NULL or not a string
    fn get_string(&self, name: &str) -> OrmResult<String> {
        match self.get_by_name(name)? {
            DatabaseValue::String(s) => Ok(s),
            other => Err(OrmError::Serialization(format!(
                "Column '{}' is not text: {:?}",
                name, other
            ))),
        }
    }
}

/// Fully materialized row: column names paired with decoded values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueRow {
    columns: Vec<String>,
    values: Vec<DatabaseValue>,
}

impl ValueRow {
    /// Create a row from parallel column/value vectors
    pub fn new(columns: Vec<String>, values: Vec<DatabaseValue>) -> Self {
        Self { columns, values }
    }
}

impl DatabaseRow for ValueRow {
    fn get_by_index(&self, index: usize) -> OrmResult<DatabaseValue> {
        self.values
            .get(index)
            .cloned()
            .ok_or_else(|| OrmError::Query(format!("Column index {} out of range", index)))
    }

    fn get_by_name(&self, name: &str) -> OrmResult<DatabaseValue> {
        let index = self
            .columns
            .iter()
            .position(|col| col == name)
            .ok_or_else(|| OrmError::Query(format!("Column '{}' not found", name)))?;
        self.get_by_index(index)
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.clone()
    }
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    Json(JsonValue),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Borrow the value as text, if it is text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int32(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Int64(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::Bytes(b) => JsonValue::Array(
                b.iter()
                    .map(|&x| JsonValue::Number(serde_json::Number::from(x)))
                    .collect(),
            ),
            DatabaseValue::Uuid(u) => JsonValue::String(u.to_string()),
            DatabaseValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            DatabaseValue::Json(j) => j.clone(),
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(value: Vec<u8>) -> Self {
        DatabaseValue::Bytes(value)
    }
}

impl From<uuid::Uuid> for DatabaseValue {
    fn from(value: uuid::Uuid) -> Self {
        DatabaseValue::Uuid(value)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DatabaseValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl From<JsonValue> for DatabaseValue {
    fn from(value: JsonValue) -> Self {
        DatabaseValue::Json(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// SQL dialect enumeration for generating database-specific SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl SqlDialect {
    /// Get the parameter placeholder style for this dialect
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::MySQL | SqlDialect::SQLite => "?".to_string(),
        }
    }

    /// Get the quote character for identifiers in this dialect
    pub fn identifier_quote(&self) -> char {
        match self {
            SqlDialect::PostgreSQL => '"',
            SqlDialect::MySQL => '`',
            SqlDialect::SQLite => '"',
        }
    }

    /// Quote an identifier, doubling any embedded quote characters
    pub fn quote_identifier(&self, ident: &str) -> String {
        let q = self.identifier_quote();
        let escaped = ident.replace(q, &format!("{}{}", q, q));
        format!("{}{}{}", q, escaped, q)
    }

    /// Quote an optionally schema-qualified table name
    pub fn qualified_table(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(table)
            ),
            None => self.quote_identifier(table),
        }
    }

    /// Whether DDL participates in transactions (and can therefore be rolled back)
    pub fn supports_transactional_ddl(&self) -> bool {
        match self {
            SqlDialect::PostgreSQL | SqlDialect::SQLite => true,
            SqlDialect::MySQL => false,
        }
    }

    /// Whether the engine has named schemas the ledger can live in
    pub fn supports_schemas(&self) -> bool {
        match self {
            SqlDialect::PostgreSQL | SqlDialect::MySQL => true,
            SqlDialect::SQLite => false,
        }
    }

    /// Introspection query returning a row iff the table exists
    pub fn table_exists_query(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> OrmResult<(String, Vec<DatabaseValue>)> {
        match (self, schema) {
            (SqlDialect::SQLite, None) => Ok((
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?".to_string(),
                vec![table.into()],
            )),
            (SqlDialect::SQLite, Some(schema)) => Err(OrmError::Configuration(format!(
                "SQLite has no schemas; cannot look up '{}.{}'",
                schema, table
            ))),
            (SqlDialect::PostgreSQL, None) => Ok((
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1"
                    .to_string(),
                vec![table.into()],
            )),
            (SqlDialect::PostgreSQL, Some(schema)) => Ok((
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name = $2"
                    .to_string(),
                vec![schema.into(), table.into()],
            )),
            (SqlDialect::MySQL, None) => Ok((
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = ?"
                    .to_string(),
                vec![table.into()],
            )),
            (SqlDialect::MySQL, Some(schema)) => Ok((
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = ? AND table_name = ?"
                    .to_string(),
                vec![schema.into(), table.into()],
            )),
        }
    }

    /// Introspection query returning a row iff the schema exists
    pub fn schema_exists_query(&self, schema: &str) -> OrmResult<(String, Vec<DatabaseValue>)> {
        if !self.supports_schemas() {
            return Err(OrmError::Configuration(format!(
                "{:?} has no schemas; cannot look up '{}'",
                self, schema
            )));
        }
        Ok((
            format!(
                "SELECT schema_name FROM information_schema.schemata WHERE schema_name = {}",
                self.parameter_placeholder(0)
            ),
            vec![schema.into()],
        ))
    }

    /// Idempotent schema creation statement
    pub fn create_schema_sql(&self, schema: &str) -> OrmResult<String> {
        if !self.supports_schemas() {
            return Err(OrmError::Configuration(format!(
                "{:?} has no schemas; cannot create '{}'",
                self, schema
            )));
        }
        Ok(format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            self.quote_identifier(schema)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(SqlDialect::PostgreSQL.parameter_placeholder(0), "$1");
        assert_eq!(SqlDialect::PostgreSQL.parameter_placeholder(2), "$3");
        assert_eq!(SqlDialect::SQLite.parameter_placeholder(4), "?");
    }

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(SqlDialect::PostgreSQL.quote_identifier("timestamp"), "\"timestamp\"");
        assert_eq!(SqlDialect::MySQL.quote_identifier("name"), "`name`");
        assert_eq!(SqlDialect::SQLite.quote_identifier("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(
            SqlDialect::PostgreSQL.qualified_table(Some("meta"), "migrations"),
            "\"meta\".\"migrations\""
        );
    }

    #[test]
    fn test_transactional_ddl_support() {
        assert!(SqlDialect::PostgreSQL.supports_transactional_ddl());
        assert!(SqlDialect::SQLite.supports_transactional_ddl());
        assert!(!SqlDialect::MySQL.supports_transactional_ddl());
    }

    #[test]
    fn test_sqlite_rejects_schema_lookups() {
        assert!(SqlDialect::SQLite.table_exists_query(Some("meta"), "migrations").is_err());
        assert!(SqlDialect::SQLite.create_schema_sql("meta").is_err());
        assert!(SqlDialect::PostgreSQL.create_schema_sql("meta").is_ok());
    }

    #[test]
    fn test_value_row_lookup() {
        let row = ValueRow::new(
            vec!["name".into(), "timestamp".into()],
            vec!["1_a".into(), DatabaseValue::Null],
        );
        assert_eq!(row.get_string("name").unwrap(), "1_a");
        assert!(row.get_by_name("timestamp").unwrap().is_null());
        assert!(row.get_string("timestamp").is_err());
        assert!(row.get_by_name("missing").is_err());
        assert_eq!(row.column_count(), 2);
    }
}
