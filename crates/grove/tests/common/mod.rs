#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use grove::prelude::*;
use grove_kv::{Item, ItemKey};
use grove_testing::CallLog;
use std::sync::Arc;

/// Seed unit that logs `<phase>:<name>` for every phase it runs.
///
/// With stores attached, habitat phases write or remove `habitat/<name>`
/// and seed phases write or remove `seed/<name>` plus a key-value item.
#[derive(Clone)]
pub struct RecordingSeed {
    name: String,
    log: CallLog,
    fail_at: Option<SeedPhase>,
}

impl RecordingSeed {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            fail_at: None,
        }
    }

    pub fn failing_at(mut self, phase: SeedPhase) -> Self {
        self.fail_at = Some(phase);
        self
    }

    fn enter(&self, phase: SeedPhase) -> anyhow::Result<()> {
        self.log.record(format!("{}:{}", phase, self.name));
        if self.fail_at == Some(phase) {
            anyhow::bail!("{} of {} failed", phase, self.name);
        }
        Ok(())
    }

    fn item_key(&self) -> ItemKey {
        ItemKey::composite("seed", self.name.clone())
    }
}

#[async_trait]
impl SeedUnit for RecordingSeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn habitat_up(&self, ctx: &mut SeedContext<'_>) -> anyhow::Result<()> {
        self.enter(SeedPhase::HabitatUp)?;
        if let Some(blobs) = ctx.blobs {
            blobs
                .put(&format!("habitat/{}", self.name), Bytes::from_static(b"habitat"))
                .await?;
        }
        Ok(())
    }

    async fn habitat_down(&self, ctx: &mut SeedContext<'_>) -> anyhow::Result<()> {
        self.enter(SeedPhase::HabitatDown)?;
        if let Some(blobs) = ctx.blobs {
            blobs.delete_batch(&[format!("habitat/{}", self.name)]).await?;
        }
        Ok(())
    }

    async fn seed_up(&self, ctx: &mut SeedContext<'_>) -> anyhow::Result<()> {
        self.enter(SeedPhase::SeedUp)?;
        if let Some(blobs) = ctx.blobs {
            blobs
                .put(&format!("seed/{}", self.name), Bytes::from_static(b"seed"))
                .await?;
        }
        if let Some(kv) = ctx.kv {
            kv.put_item(Item::new(self.item_key())).await?;
        }
        Ok(())
    }

    async fn seed_down(&self, ctx: &mut SeedContext<'_>) -> anyhow::Result<()> {
        self.enter(SeedPhase::SeedDown)?;
        if let Some(blobs) = ctx.blobs {
            blobs.delete_batch(&[format!("seed/{}", self.name)]).await?;
        }
        if let Some(kv) = ctx.kv {
            kv.batch_delete(&[self.item_key()]).await?;
        }
        Ok(())
    }
}

pub fn seeds(units: Vec<RecordingSeed>) -> Arc<dyn UnitProvider<dyn SeedUnit>> {
    let units = units
        .into_iter()
        .map(|u| Arc::new(u) as Arc<dyn SeedUnit>)
        .collect();
    Arc::new(StaticProvider::new(units))
}

pub fn recording(names: &[&str], log: &CallLog) -> Vec<RecordingSeed> {
    names.iter().map(|name| RecordingSeed::new(name, log)).collect()
}

/// Log entries starting with one of the seed phase names
pub fn seed_entries(log: &CallLog) -> Vec<String> {
    log.entries()
        .into_iter()
        .filter(|e| e.starts_with("habitat.") || e.starts_with("seed."))
        .collect()
}
