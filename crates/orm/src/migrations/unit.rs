//! Versioned units and the providers that enumerate them

use async_trait::async_trait;
use std::sync::Arc;

use crate::backends::DatabaseConnection;
use crate::error::OrmResult;

/// A named, ordered change with an `up` and an optional `down` procedure.
///
/// Names sort lexicographically; by convention they start with a millisecond
/// timestamp, e.g. `1700570553631_users`.
#[async_trait]
pub trait VersionedUnit: Send + Sync {
    fn name(&self) -> &str;

    async fn up(&self, conn: &mut dyn DatabaseConnection) -> anyhow::Result<()>;

    async fn down(&self, _conn: &mut dyn DatabaseConnection) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Source of units, loaded fresh on every sequencer invocation
#[async_trait]
pub trait UnitProvider<U: ?Sized + Send + Sync>: Send + Sync {
    async fn units(&self) -> OrmResult<Vec<Arc<U>>>;
}

/// Provider over a fixed, in-memory list of units
pub struct StaticProvider<U: ?Sized> {
    units: Vec<Arc<U>>,
}

impl<U: ?Sized> StaticProvider<U> {
    pub fn new(units: Vec<Arc<U>>) -> Self {
        Self { units }
    }

    /// Builder-style registration
    pub fn with(mut self, unit: Arc<U>) -> Self {
        self.units.push(unit);
        self
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl<U: ?Sized> Default for StaticProvider<U> {
    fn default() -> Self {
        Self { units: Vec::new() }
    }
}

#[async_trait]
impl<U: ?Sized + Send + Sync> UnitProvider<U> for StaticProvider<U> {
    async fn units(&self) -> OrmResult<Vec<Arc<U>>> {
        Ok(self.units.clone())
    }
}
