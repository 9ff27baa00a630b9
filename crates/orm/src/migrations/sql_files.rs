//! Directory-backed migration provider
//!
//! Each `*.sql` file is one unit named after its file stem. The file holds an
//! `-- up` section and an optional `-- down` section.

use async_trait::async_trait;
use chrono::Utc;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

use super::definitions::Direction;
use super::unit::{UnitProvider, VersionedUnit};
use crate::backends::DatabaseConnection;
use crate::error::{OrmError, OrmResult};

/// A migration loaded from a `.sql` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    name: String,
    up: Vec<String>,
    down: Vec<String>,
}

impl SqlMigration {
    /// Build a migration from the raw contents of a migration file
    pub fn parse(name: impl Into<String>, content: &str) -> Self {
        let (up_sql, down_sql) = split_sections(content);
        Self {
            name: name.into(),
            up: split_sql_statements(&up_sql),
            down: split_sql_statements(&down_sql),
        }
    }

    pub fn up_statements(&self) -> &[String] {
        &self.up
    }

    pub fn down_statements(&self) -> &[String] {
        &self.down
    }
}

#[async_trait]
impl VersionedUnit for SqlMigration {
    fn name(&self) -> &str {
        &self.name
    }

    async fn up(&self, conn: &mut dyn DatabaseConnection) -> anyhow::Result<()> {
        run_statements(conn, &self.up).await
    }

    async fn down(&self, conn: &mut dyn DatabaseConnection) -> anyhow::Result<()> {
        run_statements(conn, &self.down).await
    }
}

async fn run_statements(conn: &mut dyn DatabaseConnection, statements: &[String]) -> anyhow::Result<()> {
    for statement in statements {
        debug!("Executing: {}", statement);
        conn.execute(statement, &[]).await?;
    }
    Ok(())
}

/// `-- up` / `-- down` (optionally followed by `migration`) on a line of its own
fn section_marker(line: &str) -> Option<Direction> {
    let comment = line.trim().strip_prefix("--")?.trim().to_lowercase();
    let word = comment
        .strip_suffix("migration")
        .map(str::trim_end)
        .unwrap_or(&comment);
    match word {
        "up" => Some(Direction::Up),
        "down" => Some(Direction::Down),
        _ => None,
    }
}

// Lines before the first marker are ignored, as are comment-only lines
fn split_sections(content: &str) -> (String, String) {
    let mut up_sql = Vec::new();
    let mut down_sql = Vec::new();
    let mut current = None;

    for line in content.lines() {
        if let Some(direction) = section_marker(line) {
            current = Some(direction);
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }

        match current {
            Some(Direction::Up) => up_sql.push(line),
            Some(Direction::Down) => down_sql.push(line),
            None => {}
        }
    }

    (up_sql.join("\n"), down_sql.join("\n"))
}

/// Split SQL into statements using a real parser, falling back to
/// semicolon splitting for dialect-specific syntax it does not understand
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    if sql.trim().is_empty() {
        return Vec::new();
    }

    match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) => statements.into_iter().map(|s| s.to_string()).collect(),
        Err(e) => {
            warn!("SQL parsing failed, using naive semicolon splitting: {}", e);
            sql.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }
    }
}

/// Enumerates `*.sql` files in a directory
#[derive(Debug, Clone)]
pub struct SqlDirectoryProvider {
    directory: PathBuf,
}

impl SqlDirectoryProvider {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Load and parse every migration file; a missing directory yields none
    pub async fn load(&self) -> OrmResult<Vec<SqlMigration>> {
        if !fs::try_exists(&self.directory).await.unwrap_or(false) {
            debug!(directory = %self.directory.display(), "Migration directory missing");
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&self.directory).await.map_err(|e| {
            OrmError::Configuration(format!(
                "Failed to read migrations directory {}: {}",
                self.directory.display(),
                e
            ))
        })?;

        let mut migrations = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OrmError::Configuration(format!("Failed to read directory entry: {}", e)))?
        {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "sql") {
                continue;
            }

            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| {
                    OrmError::Configuration(format!(
                        "Invalid migration filename: {}",
                        path.display()
                    ))
                })?
                .to_string();

            let content = fs::read_to_string(&path).await.map_err(|e| {
                OrmError::Configuration(format!(
                    "Failed to read migration file {}: {}",
                    path.display(),
                    e
                ))
            })?;

            migrations.push(SqlMigration::parse(name, &content));
        }

        migrations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(migrations)
    }

    /// Write a new `<unix-millis>_<slug>.sql` template and return the unit name
    pub async fn create_migration(&self, description: &str) -> OrmResult<String> {
        let slug = slugify(description);
        if slug.is_empty() {
            return Err(OrmError::Configuration(format!(
                "Migration description '{}' has no usable characters",
                description
            )));
        }

        fs::create_dir_all(&self.directory).await.map_err(|e| {
            OrmError::Configuration(format!("Failed to create migrations directory: {}", e))
        })?;

        let now = Utc::now();
        let name = format!("{}_{}", now.timestamp_millis(), slug);
        let path = self.directory.join(format!("{}.sql", name));
        let template = format!(
            "-- Migration: {}\n\
             -- Created: {}\n\n\
             -- up\n\n\n\
             -- down\n\n",
            description,
            now.format("%Y-%m-%d %H:%M:%S UTC")
        );

        fs::write(&path, template).await.map_err(|e| {
            OrmError::Configuration(format!("Failed to write migration file: {}", e))
        })?;

        Ok(name)
    }
}

fn slugify(description: &str) -> String {
    description
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[async_trait]
impl UnitProvider<dyn VersionedUnit> for SqlDirectoryProvider {
    async fn units(&self) -> OrmResult<Vec<Arc<dyn VersionedUnit>>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .map(|m| Arc::new(m) as Arc<dyn VersionedUnit>)
            .collect())
    }
}
