//! PostgreSQL Backend Implementation
//!
//! Wraps a connection checked out of a caller-owned `PgPool`. PostgreSQL
//! supports transactional DDL, so whole migration batches commit or roll
//! back together.

use super::core::*;
use crate::error::{OrmError, OrmResult};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Column, PgPool, Postgres, Row, TypeInfo, ValueRef};

/// PostgreSQL connection implementation
pub struct PostgresConnection {
    conn: sqlx::pool::PoolConnection<Postgres>,
}

impl PostgresConnection {
    pub fn new(conn: sqlx::pool::PoolConnection<Postgres>) -> Self {
        Self { conn }
    }

    /// Check a connection out of the caller's pool
    pub async fn acquire(pool: &PgPool) -> OrmResult<Self> {
        let conn = pool
            .acquire()
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to acquire connection: {}", e)))?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl DatabaseConnection for PostgresConnection {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
    }

    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        let mut query = sqlx::query(sql);

        for param in params {
            query = bind_database_value(query, param)?;
        }

        let result = query.execute(&mut *self.conn).await?;
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

        let rows = query.fetch_all(&mut *self.conn).await?;

        rows.iter()
            .map(|row| materialize_row(row).map(|r| Box::new(r) as Box<dyn DatabaseRow>))
            .collect()
    }
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: &DatabaseValue,
) -> OrmResult<sqlx::query::Query<'q, Postgres, PgArguments>> {
    match value {
        DatabaseValue::Null => Ok(query.bind(Option::<String>::None)),
        DatabaseValue::Bool(b) => Ok(query.bind(*b)),
        DatabaseValue::Int32(i) => Ok(query.bind(*i)),
        DatabaseValue::Int64(i) => Ok(query.bind(*i)),
        DatabaseValue::Float64(f) => Ok(query.bind(*f)),
        DatabaseValue::String(s) => Ok(query.bind(s.clone())),
        DatabaseValue::Bytes(b) => Ok(query.bind(b.clone())),
        DatabaseValue::Uuid(u) => Ok(query.bind(*u)),
        DatabaseValue::DateTime(dt) => Ok(query.bind(*dt)),
        DatabaseValue::Json(j) => Ok(query.bind(j.clone())),
    }
}

fn materialize_row(row: &PgRow) -> OrmResult<ValueRow> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());

    for (index, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        values.push(postgres_value_to_database_value(row, index)?);
    }

    Ok(ValueRow::new(columns, values))
}

/// Convert a PostgreSQL column value to DatabaseValue
fn postgres_value_to_database_value(row: &PgRow, index: usize) -> OrmResult<DatabaseValue> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_string();

    match type_name.as_str() {
        "BOOL" => Ok(DatabaseValue::Bool(row.try_get(index)?)),
        "INT2" => Ok(DatabaseValue::Int32(row.try_get::<i16, _>(index)? as i32)),
        "INT4" => Ok(DatabaseValue::Int32(row.try_get(index)?)),
        "INT8" => Ok(DatabaseValue::Int64(row.try_get(index)?)),
        "FLOAT4" => Ok(DatabaseValue::Float64(row.try_get::<f32, _>(index)? as f64)),
        "FLOAT8" => Ok(DatabaseValue::Float64(row.try_get(index)?)),
        "BYTEA" => Ok(DatabaseValue::Bytes(row.try_get(index)?)),
        "UUID" => Ok(DatabaseValue::Uuid(row.try_get(index)?)),
        "TIMESTAMPTZ" => Ok(DatabaseValue::DateTime(row.try_get(index)?)),
        "JSON" | "JSONB" => Ok(DatabaseValue::Json(row.try_get::<JsonValue, _>(index)?)),
        _ => {
            // Fallback: anything text-like (TEXT, VARCHAR, NAME, ...) decodes as a string
            let value: String = row.try_get(index).map_err(|e| {
                OrmError::Serialization(format!(
                    "Failed to get value as string for type '{}': {}",
                    type_name, e
                ))
            })?;
            Ok(DatabaseValue::String(value))
        }
    }
}
