//! Database Seeding
//!
//! Habitat and seed fixtures attached to applied migrations.

pub mod executor;
pub mod unit;

pub use executor::{PhaseSet, ReplantRun, SeedRun, Seeder};
pub use unit::{SeedContext, SeedPhase, SeedUnit};
