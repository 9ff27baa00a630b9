//! # grove
//!
//! Versioned migration and seed orchestration. Applies schema migrations in
//! a deterministic, resumable order tracked by a ledger table, attaches
//! habitat and seed fixtures to applied migrations, and clears artifacts
//! held in blob and key-value stores.
//!
//! This is the umbrella package: it re-exports the component crates and adds
//! seeding, reconciliation and the workflow driver on top.
//!
//! ```rust,no_run
//! use grove::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn demo(conn: &mut dyn DatabaseConnection) -> GroveResult<()> {
//! let migrations = Arc::new(SqlDirectoryProvider::new("migrations"));
//! let seeds: Arc<StaticProvider<dyn SeedUnit>> = Arc::new(StaticProvider::default());
//!
//! let orchestrator = Orchestrator::new(GroveConfig::from_env()?, migrations, seeds)?
//!     .with_blob_store(Arc::new(grove::storage::MemoryBackend::new("assets")));
//!
//! let report = orchestrator.setup(conn).await?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```

// Re-export all sub-packages as modules
pub use grove_core as core;
pub use grove_kv as kv;
pub use grove_orm as orm;
pub use grove_storage as storage;

pub mod config;
pub mod driver;
pub mod error;
pub mod prelude;
pub mod reconciler;
pub mod seeding;
pub mod telemetry;

pub use config::GroveConfig;
pub use driver::{Orchestrator, Workflow, WorkflowReport};
pub use error::{ExternalStoreError, GroveError, GroveResult};
pub use reconciler::Reconciler;
pub use seeding::{PhaseSet, ReplantRun, SeedContext, SeedPhase, SeedRun, SeedUnit, Seeder};
pub use telemetry::{init_from_config, init_tracing};

/// Current version of grove
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
