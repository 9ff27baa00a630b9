//! Database testing utilities
//!
//! - In-memory SQLite databases that are thrown away with the fixture
//! - A connection wrapper that hides transactional DDL support, so the
//!   sequential (no rollback) path can be exercised on SQLite

use async_trait::async_trait;
use grove_orm::{
    DatabaseConnection, DatabaseRow, DatabaseValue, LedgerTable, OrmResult, SqlDialect,
    SqliteConnection,
};

use crate::{TestError, TestResult};

/// Throwaway in-memory SQLite database
pub struct TestDatabase {
    conn: SqliteConnection,
}

impl TestDatabase {
    /// Open a fresh, empty database
    pub async fn new() -> TestResult<Self> {
        let conn = SqliteConnection::connect("sqlite::memory:").await?;
        Ok(Self { conn })
    }

    /// Connection to hand to the engine
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    /// The same connection, reporting no transactional DDL support
    pub fn non_transactional(&mut self) -> NonTransactional<'_> {
        NonTransactional::new(&mut self.conn)
    }

    /// Execute a raw SQL statement (for test setup)
    pub async fn execute(&mut self, sql: &str) -> TestResult<()> {
        self.conn.execute(sql, &[]).await?;
        Ok(())
    }

    pub async fn table_exists(&mut self, table: &str) -> TestResult<bool> {
        Ok(self.conn.table_exists(None, table).await?)
    }

    /// Count rows in a table
    pub async fn count_records(&mut self, table: &str) -> TestResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS count FROM {}",
            SqlDialect::SQLite.quote_identifier(table)
        );
        let row = self
            .conn
            .fetch_optional(&sql, &[])
            .await?
            .ok_or_else(|| TestError::Setup(format!("COUNT(*) on {} returned no row", table)))?;

        match row.get_by_name("count")? {
            DatabaseValue::Int64(count) => Ok(count),
            other => Err(TestError::Assertion {
                message: format!("unexpected COUNT(*) value {:?}", other),
            }),
        }
    }

    /// Ledger names in execution order (timestamp, then name)
    pub async fn ledger_names(&mut self, ledger: &LedgerTable) -> TestResult<Vec<String>> {
        if !ledger.exists(&mut self.conn).await? {
            return Ok(Vec::new());
        }
        Ok(ledger
            .records(&mut self.conn)
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect())
    }

    /// Write a ledger row directly, bypassing any unit
    pub async fn plant_ledger_row(
        &mut self,
        ledger: &LedgerTable,
        name: &str,
        executed_at: &str,
    ) -> TestResult<()> {
        ledger.ensure(&mut self.conn).await?;
        let sql = format!(
            "INSERT INTO {} (\"name\", \"timestamp\") VALUES (?, ?)",
            SqlDialect::SQLite.quote_identifier(ledger.table())
        );
        self.conn
            .execute(&sql, &[name.into(), executed_at.into()])
            .await?;
        Ok(())
    }
}

/// Delegating connection that claims the engine cannot roll back DDL
pub struct NonTransactional<'a> {
    inner: &'a mut dyn DatabaseConnection,
}

impl<'a> NonTransactional<'a> {
    pub fn new(inner: &'a mut dyn DatabaseConnection) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<'a> DatabaseConnection for NonTransactional<'a> {
    fn dialect(&self) -> SqlDialect {
        self.inner.dialect()
    }

    fn supports_transactional_ddl(&self) -> bool {
        false
    }

    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        self.inner.execute(sql, params).await
    }

    async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        self.inner.fetch_all(sql, params).await
    }
}
