//! Seed/Habitat Executor
//!
//! Keeps no ledger of its own. The units to process are the migrations the
//! [`Migrator`] reports as applied, ordered by numeric name prefix rather
//! than by string order, so `9_x` runs before `10_y`.
//!
//! Unlike the sequencer, failures are not collected into a result set: the
//! first failing phase aborts the batch and is returned as the error.

use grove_orm::{compare_numeric_prefix, Migrator, UnitProvider};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use super::unit::{run_phase, SeedContext, SeedPhase, SeedUnit};
use crate::error::{GroveError, GroveResult};

/// Which phases a seed pass runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseSet {
    /// Habitat and seed phases
    All,
    /// Seed phases only; habitat data is left in place
    SeedOnly,
}

impl PhaseSet {
    fn up(&self) -> &'static [SeedPhase] {
        match self {
            PhaseSet::All => &[SeedPhase::HabitatUp, SeedPhase::SeedUp],
            PhaseSet::SeedOnly => &[SeedPhase::SeedUp],
        }
    }

    fn down(&self) -> &'static [SeedPhase] {
        match self {
            PhaseSet::All => &[SeedPhase::SeedDown, SeedPhase::HabitatDown],
            PhaseSet::SeedOnly => &[SeedPhase::SeedDown],
        }
    }
}

/// What a seed pass ran, in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedRun {
    pub units: Vec<String>,
    pub phases: Vec<(String, SeedPhase)>,
}

impl SeedRun {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Outcome of [`Seeder::replant`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplantRun {
    pub removed: SeedRun,
    pub planted: SeedRun,
}

/// Applies and reverts fixture data for applied migrations
pub struct Seeder {
    migrator: Arc<Migrator>,
    provider: Arc<dyn UnitProvider<dyn SeedUnit>>,
}

impl Seeder {
    pub fn new(migrator: Arc<Migrator>, provider: Arc<dyn UnitProvider<dyn SeedUnit>>) -> Self {
        Self { migrator, provider }
    }

    /// Seed units of applied migrations, in numeric-prefix order
    pub async fn plan(&self, ctx: &mut SeedContext<'_>) -> GroveResult<Vec<Arc<dyn SeedUnit>>> {
        let state = self.migrator.state(&mut *ctx.conn).await?;
        let known: HashSet<&str> = state.all_units.iter().map(|u| u.name()).collect();

        let mut seeds: HashMap<String, Arc<dyn SeedUnit>> = HashMap::new();
        for seed in self.provider.units().await? {
            let name = seed.name().to_string();
            if !known.contains(name.as_str()) {
                return Err(GroveError::Configuration(format!(
                    "seed unit '{}' has no matching migration",
                    name
                )));
            }
            if seeds.insert(name.clone(), seed).is_some() {
                return Err(GroveError::Configuration(format!(
                    "duplicate seed unit name: '{}'",
                    name
                )));
            }
        }

        let mut applied: Vec<&str> = state.executed.iter().map(|r| r.name.as_str()).collect();
        applied.sort_by(|a, b| compare_numeric_prefix(a, b));

        Ok(applied
            .into_iter()
            .filter_map(|name| seeds.get(name).cloned())
            .collect())
    }

    /// Run the up phases of every planned unit, first to last
    pub async fn seed_up(
        &self,
        ctx: &mut SeedContext<'_>,
        phases: PhaseSet,
    ) -> GroveResult<SeedRun> {
        let units = self.plan(ctx).await?;
        info!(units = units.len(), ?phases, "Seeding up");
        Self::run(&units, phases.up(), ctx).await
    }

    /// Run the down phases of every planned unit, last to first
    pub async fn seed_down(
        &self,
        ctx: &mut SeedContext<'_>,
        phases: PhaseSet,
    ) -> GroveResult<SeedRun> {
        let mut units = self.plan(ctx).await?;
        units.reverse();
        info!(units = units.len(), ?phases, "Seeding down");
        Self::run(&units, phases.down(), ctx).await
    }

    /// Discard and regenerate seed data, leaving habitat data untouched
    pub async fn replant(&self, ctx: &mut SeedContext<'_>) -> GroveResult<ReplantRun> {
        let removed = self.seed_down(ctx, PhaseSet::SeedOnly).await?;
        let planted = self.seed_up(ctx, PhaseSet::SeedOnly).await?;
        Ok(ReplantRun { removed, planted })
    }

    async fn run(
        units: &[Arc<dyn SeedUnit>],
        phases: &[SeedPhase],
        ctx: &mut SeedContext<'_>,
    ) -> GroveResult<SeedRun> {
        let mut run = SeedRun::default();
        for unit in units {
            for &phase in phases {
                debug!(unit = unit.name(), %phase, "Running seed phase");
                run_phase(unit.as_ref(), phase, ctx)
                    .await
                    .map_err(|source| GroveError::Seed {
                        unit: unit.name().to_string(),
                        phase,
                        source,
                    })?;
                run.phases.push((unit.name().to_string(), phase));
            }
            run.units.push(unit.name().to_string());
        }
        Ok(run)
    }
}
