//! Transaction Adapter
//!
//! Runs a connection-scoped unit of work atomically when the engine can roll
//! back schema changes, and as independently committed statements when it
//! cannot.

use crate::backends::DatabaseConnection;
use crate::error::OrmError;
use futures::future::BoxFuture;
use std::fmt;
use tracing::{debug, error, warn};

/// How a batch of work is bracketed on the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// BEGIN / COMMIT around the whole batch, ROLLBACK on failure
    Atomic,
    /// No bracketing; every statement commits on its own
    Sequential,
}

impl TransactionMode {
    /// Pick the mode a connection can honour
    pub fn for_connection(conn: &dyn DatabaseConnection) -> Self {
        if conn.supports_transactional_ddl() {
            TransactionMode::Atomic
        } else {
            TransactionMode::Sequential
        }
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionMode::Atomic => write!(f, "atomic"),
            TransactionMode::Sequential => write!(f, "sequential"),
        }
    }
}

/// Outcome of a failed [`TransactionAdapter::run`]
#[derive(Debug, thiserror::Error)]
pub enum TransactionError<E> {
    #[error("Failed to begin transaction: {0}")]
    Begin(OrmError),

    /// The work itself failed. `rolled_back` is true only when an atomic
    /// rollback completed, i.e. none of the work's effects persisted.
    #[error("{error}")]
    Work { error: E, rolled_back: bool },

    #[error("Failed to commit transaction: {0}")]
    Commit(OrmError),
}

/// Executes connection-scoped closures under the appropriate [`TransactionMode`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionAdapter {
    forced: Option<TransactionMode>,
}

impl TransactionAdapter {
    /// Detect the mode from each connection
    pub fn new() -> Self {
        Self::default()
    }

    /// Always use the given mode, regardless of what the engine supports
    pub fn with_mode(mode: TransactionMode) -> Self {
        Self { forced: Some(mode) }
    }

    /// Mode that [`run`](Self::run) will use for this connection
    pub fn mode_for(&self, conn: &dyn DatabaseConnection) -> TransactionMode {
        self.forced
            .unwrap_or_else(|| TransactionMode::for_connection(conn))
    }

    /// Run `work` against `conn`.
    ///
    /// The closure receives the same connection back, so everything it does
    /// lands inside the transaction when one is opened.
    pub async fn run<T, E, F>(
        &self,
        conn: &mut dyn DatabaseConnection,
        work: F,
    ) -> Result<T, TransactionError<E>>
    where
        F: for<'c> FnOnce(&'c mut dyn DatabaseConnection) -> BoxFuture<'c, Result<T, E>> + Send,
        T: Send,
        E: Send,
    {
        let mode = self.mode_for(&*conn);

        if mode == TransactionMode::Sequential {
            debug!("Running work without a transaction");
            return work(&mut *conn).await.map_err(|error| TransactionError::Work {
                error,
                rolled_back: false,
            });
        }

        conn.begin().await.map_err(TransactionError::Begin)?;
        debug!("Transaction opened");

        match work(&mut *conn).await {
            Ok(value) => {
                if let Err(e) = conn.commit().await {
                    error!("Commit failed: {}", e);
                    if let Err(rollback_err) = conn.rollback().await {
                        warn!("Rollback after failed commit also failed: {}", rollback_err);
                    }
                    return Err(TransactionError::Commit(e));
                }
                debug!("Transaction committed");
                Ok(value)
            }
            Err(error) => {
                let rolled_back = match conn.rollback().await {
                    Ok(()) => {
                        warn!("Transaction rolled back");
                        true
                    }
                    Err(e) => {
                        error!("Rollback failed: {}", e);
                        false
                    }
                };
                Err(TransactionError::Work { error, rolled_back })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SqliteConnection;

    async fn count_rows(conn: &mut dyn DatabaseConnection) -> usize {
        conn.fetch_all("SELECT id FROM items", &[]).await.unwrap().len()
    }

    #[tokio::test]
    async fn test_atomic_commit() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        conn.execute("CREATE TABLE items (id INTEGER)", &[]).await.unwrap();

        let adapter = TransactionAdapter::new();
        assert_eq!(adapter.mode_for(&conn), TransactionMode::Atomic);

        let inserted = adapter
            .run(&mut conn, |c| {
                Box::pin(async move {
                    c.execute("INSERT INTO items (id) VALUES (1)", &[]).await?;
                    c.execute("INSERT INTO items (id) VALUES (2)", &[]).await
                })
            })
            .await
            .map_err(|e: TransactionError<OrmError>| e.to_string())
            .unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(count_rows(&mut conn).await, 2);
    }

    #[tokio::test]
    async fn test_atomic_failure_rolls_back() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        conn.execute("CREATE TABLE items (id INTEGER)", &[]).await.unwrap();

        let result = TransactionAdapter::new()
            .run(&mut conn, |c| {
                Box::pin(async move {
                    c.execute("INSERT INTO items (id) VALUES (1)", &[]).await?;
                    c.execute("INSERT INTO missing (id) VALUES (2)", &[]).await
                })
            })
            .await;

        match result {
            Err(TransactionError::Work { rolled_back, .. }) => assert!(rolled_back),
            other => panic!("expected work failure, got {:?}", other.map(|_| ())),
        }
        assert_eq!(count_rows(&mut conn).await, 0);
    }

    #[tokio::test]
    async fn test_sequential_failure_keeps_earlier_statements() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        conn.execute("CREATE TABLE items (id INTEGER)", &[]).await.unwrap();

        let result = TransactionAdapter::with_mode(TransactionMode::Sequential)
            .run(&mut conn, |c| {
                Box::pin(async move {
                    c.execute("INSERT INTO items (id) VALUES (1)", &[]).await?;
                    c.execute("INSERT INTO missing (id) VALUES (2)", &[]).await
                })
            })
            .await;

        match result {
            Err(TransactionError::Work { rolled_back, .. }) => assert!(!rolled_back),
            other => panic!("expected work failure, got {:?}", other.map(|_| ())),
        }
        assert_eq!(count_rows(&mut conn).await, 1);
    }
}
