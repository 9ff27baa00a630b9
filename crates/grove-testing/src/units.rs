//! Instrumented units
//!
//! [`ScriptedMigration`] creates one table on `up` and drops it on `down`,
//! recording every call in a shared [`CallLog`]. Either direction can be
//! told to fail.

use async_trait::async_trait;
use grove_orm::{DatabaseConnection, SqlDialect, StaticProvider, UnitProvider, VersionedUnit};
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared, ordered record of calls made by instrumented units
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Snapshot of everything recorded so far
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Table a scripted migration owns: `t_` plus the unit name
pub fn table_for(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("t_{}", cleaned)
}

/// Migration that creates (and drops) its own table and logs `up:<name>` / `down:<name>`
#[derive(Debug, Clone)]
pub struct ScriptedMigration {
    name: String,
    log: CallLog,
    fail_up: bool,
    fail_down: bool,
}

impl ScriptedMigration {
    pub fn new(name: impl Into<String>, log: &CallLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            fail_up: false,
            fail_down: false,
        }
    }

    /// `up` creates the table, then fails
    pub fn failing_up(mut self) -> Self {
        self.fail_up = true;
        self
    }

    /// `down` fails before touching anything
    pub fn failing_down(mut self) -> Self {
        self.fail_down = true;
        self
    }

    pub fn table(&self) -> String {
        table_for(&self.name)
    }
}

#[async_trait]
impl VersionedUnit for ScriptedMigration {
    fn name(&self) -> &str {
        &self.name
    }

    async fn up(&self, conn: &mut dyn DatabaseConnection) -> anyhow::Result<()> {
        self.log.record(format!("up:{}", self.name));
        let sql = format!(
            "CREATE TABLE {} (id INTEGER PRIMARY KEY)",
            SqlDialect::SQLite.quote_identifier(&self.table())
        );
        conn.execute(&sql, &[]).await?;
        if self.fail_up {
            anyhow::bail!("scripted failure in {}", self.name);
        }
        Ok(())
    }

    async fn down(&self, conn: &mut dyn DatabaseConnection) -> anyhow::Result<()> {
        self.log.record(format!("down:{}", self.name));
        if self.fail_down {
            anyhow::bail!("scripted failure in {}", self.name);
        }
        let sql = format!(
            "DROP TABLE {}",
            SqlDialect::SQLite.quote_identifier(&self.table())
        );
        conn.execute(&sql, &[]).await?;
        Ok(())
    }
}

/// Provider over scripted migrations, in the order given
pub fn provider(units: Vec<ScriptedMigration>) -> Arc<dyn UnitProvider<dyn VersionedUnit>> {
    let units = units
        .into_iter()
        .map(|u| Arc::new(u) as Arc<dyn VersionedUnit>)
        .collect();
    Arc::new(StaticProvider::new(units))
}

/// Scripted migrations with the given names sharing one log
pub fn scripted(names: &[&str], log: &CallLog) -> Vec<ScriptedMigration> {
    names
        .iter()
        .map(|name| ScriptedMigration::new(*name, log))
        .collect()
}
