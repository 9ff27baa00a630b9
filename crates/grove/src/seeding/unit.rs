//! Seed units and the context they run in

use async_trait::async_trait;
use grove_kv::KeyValueBackend;
use grove_orm::DatabaseConnection;
use grove_storage::BlobBackend;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four procedures of a seed unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeedPhase {
    HabitatUp,
    SeedUp,
    SeedDown,
    HabitatDown,
}

impl SeedPhase {
    pub fn is_habitat(&self) -> bool {
        matches!(self, SeedPhase::HabitatUp | SeedPhase::HabitatDown)
    }
}

impl fmt::Display for SeedPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SeedPhase::HabitatUp => "habitat.up",
            SeedPhase::SeedUp => "seed.up",
            SeedPhase::SeedDown => "seed.down",
            SeedPhase::HabitatDown => "habitat.down",
        };
        f.write_str(name)
    }
}

/// Handles a seed procedure may touch. The caller owns all of them.
pub struct SeedContext<'a> {
    pub conn: &'a mut dyn DatabaseConnection,
    pub blobs: Option<&'a dyn BlobBackend>,
    pub kv: Option<&'a dyn KeyValueBackend>,
}

impl<'a> SeedContext<'a> {
    pub fn new(conn: &'a mut dyn DatabaseConnection) -> Self {
        Self {
            conn,
            blobs: None,
            kv: None,
        }
    }

    pub fn with_blobs(mut self, blobs: &'a dyn BlobBackend) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn with_kv(mut self, kv: &'a dyn KeyValueBackend) -> Self {
        self.kv = Some(kv);
        self
    }

    /// The blob store, or an error naming the missing handle
    pub fn blobs(&self) -> anyhow::Result<&'a dyn BlobBackend> {
        self.blobs
            .ok_or_else(|| anyhow::anyhow!("no blob store configured for seeding"))
    }

    pub fn kv(&self) -> anyhow::Result<&'a dyn KeyValueBackend> {
        self.kv
            .ok_or_else(|| anyhow::anyhow!("no key-value store configured for seeding"))
    }
}

/// Fixture data attached to the migration of the same name.
///
/// Habitat procedures hold durable fixtures that survive a replant; seed
/// procedures hold data that is freely discarded and regenerated. Seed data
/// may reference habitat data, never the other way round.
#[async_trait]
pub trait SeedUnit: Send + Sync {
    /// Must equal the name of the migration this unit belongs to
    fn name(&self) -> &str;

    async fn habitat_up(&self, _ctx: &mut SeedContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn habitat_down(&self, _ctx: &mut SeedContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn seed_up(&self, _ctx: &mut SeedContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn seed_down(&self, _ctx: &mut SeedContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Run one phase of `unit`
pub(crate) async fn run_phase(
    unit: &dyn SeedUnit,
    phase: SeedPhase,
    ctx: &mut SeedContext<'_>,
) -> anyhow::Result<()> {
    match phase {
        SeedPhase::HabitatUp => unit.habitat_up(ctx).await,
        SeedPhase::SeedUp => unit.seed_up(ctx).await,
        SeedPhase::SeedDown => unit.seed_down(ctx).await,
        SeedPhase::HabitatDown => unit.habitat_down(ctx).await,
    }
}
