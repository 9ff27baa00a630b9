//! # Prelude
//!
//! ```rust
//! use grove::prelude::*;
//! ```

pub use crate::{
    ExternalStoreError, GroveConfig, GroveError, GroveResult, Orchestrator, PhaseSet, Reconciler,
    SeedContext, SeedPhase, SeedUnit, Seeder, Workflow, WorkflowReport,
};

pub use grove_core::{AppConfigTrait, Environment};
pub use grove_kv::{KeyValueBackend, PartitionQuery};
pub use grove_orm::{
    DatabaseConnection, Direction, LedgerTable, MigrationError, Migrator, ResultSet,
    SqlDirectoryProvider, StaticProvider, Step, Target, UnitProvider, UnitStatus, VersionedUnit,
};
pub use grove_storage::BlobBackend;

// Async traits
pub use async_trait::async_trait;
