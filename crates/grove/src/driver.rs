//! Orchestration Driver
//!
//! Fixed workflows over the migrator, the seeder and the reconciler:
//!
//! - `migrate`: apply every pending migration
//! - `seed`: habitat and seed phases for the applied migrations
//! - `reset`: revert every migration, then clear the blob bucket and the key-value table
//! - `setup`: `migrate` followed by `seed`
//!
//! A workflow stops at the first failure. Nothing already done is undone
//! beyond what the migrator's own transaction handling provides.

use grove_core::AppConfigTrait;
use grove_kv::KeyValueBackend;
use grove_orm::{DatabaseConnection, Direction, Migrator, Step, UnitProvider, UnitResult, VersionedUnit};
use grove_storage::BlobBackend;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::GroveConfig;
use crate::error::{GroveError, GroveResult};
use crate::reconciler::Reconciler;
use crate::seeding::{PhaseSet, SeedContext, SeedUnit, Seeder};

/// The workflows an [`Orchestrator`] runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Workflow {
    Migrate,
    Seed,
    Reset,
    Setup,
}

impl Workflow {
    /// Whether the workflow writes fixtures or destroys data
    pub fn is_destructive(&self) -> bool {
        !matches!(self, Workflow::Migrate)
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Workflow::Migrate => "migrate",
            Workflow::Seed => "seed",
            Workflow::Reset => "reset",
            Workflow::Setup => "setup",
        };
        f.write_str(name)
    }
}

/// What a workflow did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowReport {
    pub workflow: Workflow,
    /// Migration units processed, in execution order
    pub migrations: Vec<UnitResult>,
    /// Seed units whose phases ran, in execution order
    pub seeded: Vec<String>,
    pub blobs_cleared: usize,
    pub items_cleared: usize,
}

impl WorkflowReport {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            migrations: Vec::new(),
            seeded: Vec::new(),
            blobs_cleared: 0,
            items_cleared: 0,
        }
    }

    pub fn migration_names(&self) -> Vec<&str> {
        self.migrations.iter().map(|r| r.name.as_str()).collect()
    }
}

impl fmt::Display for WorkflowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} migrations, {} seeded, {} blobs cleared, {} items cleared",
            self.workflow,
            self.migrations.len(),
            self.seeded.len(),
            self.blobs_cleared,
            self.items_cleared
        )
    }
}

/// Runs the migrate, seed, reset and setup workflows.
///
/// The store handles are owned by the caller and only borrowed per call;
/// workflows that need a store which was not supplied skip that step.
pub struct Orchestrator {
    config: GroveConfig,
    migrator: Arc<Migrator>,
    seeder: Seeder,
    reconciler: Reconciler,
    blobs: Option<Arc<dyn BlobBackend>>,
    kv: Option<Arc<dyn KeyValueBackend>>,
}

impl Orchestrator {
    pub fn new(
        config: GroveConfig,
        migrations: Arc<dyn UnitProvider<dyn VersionedUnit>>,
        seeds: Arc<dyn UnitProvider<dyn SeedUnit>>,
    ) -> GroveResult<Self> {
        let migrator = Migrator::with_config(migrations, config.sequencer_config());
        Self::from_parts(config, migrator, seeds)
    }

    /// Use a preconfigured migrator, e.g. one with a forced transaction mode
    pub fn from_parts(
        config: GroveConfig,
        migrator: Migrator,
        seeds: Arc<dyn UnitProvider<dyn SeedUnit>>,
    ) -> GroveResult<Self> {
        config.validate()?;
        let migrator = Arc::new(migrator);
        Ok(Self {
            seeder: Seeder::new(migrator.clone(), seeds),
            reconciler: Reconciler::from_config(&config),
            migrator,
            config,
            blobs: None,
            kv: None,
        })
    }

    pub fn with_blob_store(mut self, store: Arc<dyn BlobBackend>) -> Self {
        self.blobs = Some(store);
        self
    }

    pub fn with_kv_store(mut self, store: Arc<dyn KeyValueBackend>) -> Self {
        self.kv = Some(store);
        self
    }

    pub fn config(&self) -> &GroveConfig {
        &self.config
    }

    pub fn migrator(&self) -> &Migrator {
        &self.migrator
    }

    pub fn seeder(&self) -> &Seeder {
        &self.seeder
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Seed context over `conn` and the configured stores
    pub fn seed_context<'a>(&'a self, conn: &'a mut dyn DatabaseConnection) -> SeedContext<'a> {
        SeedContext {
            conn,
            blobs: self.blobs.as_deref(),
            kv: self.kv.as_deref(),
        }
    }

    #[tracing::instrument(name = "migrate", skip_all)]
    pub async fn migrate(&self, conn: &mut dyn DatabaseConnection) -> GroveResult<WorkflowReport> {
        let mut report = WorkflowReport::new(Workflow::Migrate);
        self.run_migrations(conn, Workflow::Migrate, Direction::Up, &mut report)
            .await?;
        info!(%report, "Workflow finished");
        Ok(report)
    }

    #[tracing::instrument(name = "seed", skip_all)]
    pub async fn seed(&self, conn: &mut dyn DatabaseConnection) -> GroveResult<WorkflowReport> {
        self.guard(Workflow::Seed)?;
        let mut report = WorkflowReport::new(Workflow::Seed);
        self.run_seeds(conn, &mut report).await?;
        info!(%report, "Workflow finished");
        Ok(report)
    }

    #[tracing::instrument(name = "reset", skip_all)]
    pub async fn reset(&self, conn: &mut dyn DatabaseConnection) -> GroveResult<WorkflowReport> {
        self.guard(Workflow::Reset)?;
        let mut report = WorkflowReport::new(Workflow::Reset);
        self.run_migrations(conn, Workflow::Reset, Direction::Down, &mut report)
            .await?;

        match &self.blobs {
            Some(store) => {
                let prefix = self.config.blob_reset_prefix.as_deref();
                let stats = self.reconciler.clear_blob_prefix(store.as_ref(), prefix).await?;
                report.blobs_cleared = stats.deleted;
            }
            None => debug!("No blob store configured; skipping blob cleanup"),
        }

        match &self.kv {
            Some(store) => {
                let stats = self
                    .reconciler
                    .clear_key_value_partition(store.as_ref(), None)
                    .await?;
                report.items_cleared = stats.deleted;
            }
            None => debug!("No key-value store configured; skipping table cleanup"),
        }

        info!(%report, "Workflow finished");
        Ok(report)
    }

    #[tracing::instrument(name = "setup", skip_all)]
    pub async fn setup(&self, conn: &mut dyn DatabaseConnection) -> GroveResult<WorkflowReport> {
        self.guard(Workflow::Setup)?;
        let mut report = WorkflowReport::new(Workflow::Setup);
        self.run_migrations(conn, Workflow::Setup, Direction::Up, &mut report)
            .await?;
        self.run_seeds(conn, &mut report).await?;
        info!(%report, "Workflow finished");
        Ok(report)
    }

    fn guard(&self, workflow: Workflow) -> GroveResult<()> {
        if workflow.is_destructive() && !self.config.destructive_allowed() {
            error!(%workflow, environment = %self.config.environment, "Workflow refused");
            return Err(GroveError::EnvironmentGuard {
                workflow,
                environment: self.config.environment,
            });
        }
        Ok(())
    }

    async fn run_migrations(
        &self,
        conn: &mut dyn DatabaseConnection,
        workflow: Workflow,
        direction: Direction,
        report: &mut WorkflowReport,
    ) -> GroveResult<()> {
        let results = self.migrator.apply(conn, direction, Step::All).await?;
        if results.error.is_some() {
            error!(
                %workflow,
                unit = results.failed_unit().unwrap_or("-"),
                rolled_back = results.rolled_back,
                "Migration step failed"
            );
            return Err(GroveError::MigrationStep { workflow, results });
        }
        report.migrations.extend(results.results);
        Ok(())
    }

    async fn run_seeds(
        &self,
        conn: &mut dyn DatabaseConnection,
        report: &mut WorkflowReport,
    ) -> GroveResult<()> {
        let mut ctx = self.seed_context(conn);
        let run = self.seeder.seed_up(&mut ctx, PhaseSet::All).await?;
        report.seeded = run.units;
        Ok(())
    }
}
