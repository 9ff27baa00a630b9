//! SQLite Backend Implementation
//!
//! Wraps a caller-owned `sqlx::SqliteConnection`. SQLite runs DDL inside
//! transactions, so migration batches against it are applied atomically.

use super::core::*;
use crate::error::{OrmError, OrmResult};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Connection, Row, Sqlite, TypeInfo, ValueRef};

/// SQLite connection adapter
pub struct SqliteConnection {
    conn: sqlx::SqliteConnection,
}

impl SqliteConnection {
    /// Wrap an already-open sqlx connection
    pub fn new(conn: sqlx::SqliteConnection) -> Self {
        Self { conn }
    }

    /// Open a connection from a URL such as `sqlite::memory:` or `sqlite://app.db`
    pub async fn connect(url: &str) -> OrmResult<Self> {
        let conn = sqlx::SqliteConnection::connect(url)
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to open SQLite database: {}", e)))?;
        Ok(Self::new(conn))
    }

    /// Give the underlying connection back to the caller
    pub fn into_inner(self) -> sqlx::SqliteConnection {
        self.conn
    }
}

#[async_trait]
impl DatabaseConnection for SqliteConnection {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::SQLite
    }

    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        let mut query = sqlx::query(sql);

        for param in params {
            query = bind_database_value(query, param)?;
        }

        let result = query.execute(&mut self.conn).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        let mut query = sqlx::query(sql);

        for param in params {
            query = bind_database_value(query, param)?;
        }

        let rows = query.fetch_all(&mut self.conn).await?;

        rows.iter()
            .map(|row| materialize_row(row).map(|r| Box::new(r) as Box<dyn DatabaseRow>))
            .collect()
    }
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &DatabaseValue,
) -> OrmResult<sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>> {
    match value {
        DatabaseValue::Null => Ok(query.bind(Option::<String>::None)),
        DatabaseValue::Bool(b) => Ok(query.bind(*b)),
        DatabaseValue::Int32(i) => Ok(query.bind(*i)),
        DatabaseValue::Int64(i) => Ok(query.bind(*i)),
        DatabaseValue::Float64(f) => Ok(query.bind(*f)),
        DatabaseValue::String(s) => Ok(query.bind(s.clone())),
        DatabaseValue::Bytes(b) => Ok(query.bind(b.clone())),
        DatabaseValue::Uuid(u) => Ok(query.bind(u.to_string())),
        DatabaseValue::DateTime(dt) => Ok(query.bind(dt.to_rfc3339())),
        DatabaseValue::Json(j) => Ok(query.bind(j.to_string())),
    }
}

/// Decode every column of a SQLite row by its runtime storage class
fn materialize_row(row: &SqliteRow) -> OrmResult<ValueRow> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());

    for (index, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        values.push(sqlite_value_to_database_value(row, index)?);
    }

    Ok(ValueRow::new(columns, values))
}

fn sqlite_value_to_database_value(row: &SqliteRow, index: usize) -> OrmResult<DatabaseValue> {
    let type_name = {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(DatabaseValue::Null);
        }
        raw.type_info().name().to_string()
    };

    match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => Ok(DatabaseValue::Int64(row.try_get::<i64, _>(index)?)),
        "REAL" => Ok(DatabaseValue::Float64(row.try_get::<f64, _>(index)?)),
        "BLOB" => Ok(DatabaseValue::Bytes(row.try_get::<Vec<u8>, _>(index)?)),
        _ => Ok(DatabaseValue::String(row.try_get::<String, _>(index)?)),
    }
}
