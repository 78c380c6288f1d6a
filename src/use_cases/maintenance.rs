// Player-initiated generator flows: place, remove, fix, upgrade, and world-load restoration.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::errors::{MaintenanceError, StoreError};
use crate::domain::generator::{ActiveGenerator, GeneratorType, Location};
use crate::domain::placement::{PlacementSafety, classify};
use crate::domain::ports::Economy;
use crate::domain::presentation::{
    LABEL_GENERATOR_FIXED, LABEL_GENERATOR_UPGRADED, PresentationCommand, placeholders,
};
use crate::use_cases::context::EngineContext;

const AIR: &str = "air";

#[derive(Clone, Copy, Debug)]
pub struct RestoreSettings {
    /// Refuse to overwrite blocks that are neither empty, the generator itself, nor natural terrain.
    pub safe_restoration: bool,
    /// Unregister records whose location was refused.
    pub cleanup_orphaned: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub restored: usize,
    pub skipped: usize,
    pub purged: usize,
}

pub struct GeneratorMaintenance {
    ctx: EngineContext,
    economy: Arc<dyn Economy>,
    restore: RestoreSettings,
}

impl GeneratorMaintenance {
    pub fn new(ctx: EngineContext, economy: Arc<dyn Economy>, restore: RestoreSettings) -> Self {
        Self {
            ctx,
            economy,
            restore,
        }
    }

    pub async fn place(
        &self,
        owner: Uuid,
        location: Location,
        generator_id: &str,
    ) -> Result<ActiveGenerator, MaintenanceError> {
        let gen_type = self.gen_type(generator_id)?;
        let id = location.id();
        if self.ctx.repository.get(&id).await?.is_some() {
            return Err(MaintenanceError::Occupied);
        }

        let generator = ActiveGenerator::new(owner, location, generator_id);
        self.ctx.repository.register(&generator).await?;
        // Start simulating right away when the lease is free; otherwise the next scan decides.
        match self.ctx.locks.acquire(&id).await {
            Ok(true) => self.ctx.cache.insert(generator.clone()).await,
            Ok(false) => {}
            Err(err) => warn!(generator_id = %id, error = %err, "lease acquire after placement failed"),
        }
        self.ctx.presentation.dispatch(PresentationCommand::SetBlock {
            location: generator.location.clone(),
            block: gen_type.block.clone(),
        });
        info!(generator_id = %id, owner = %owner, generator_type = generator_id, "generator placed");
        Ok(generator)
    }

    pub async fn remove(&self, actor: Uuid, id: &str) -> Result<ActiveGenerator, MaintenanceError> {
        let generator = self.lease(id).await?;
        if generator.owner != actor {
            return Err(MaintenanceError::NotOwner);
        }

        self.ctx.repository.unregister(id).await?;
        self.ctx.cache.invalidate(id).await;
        self.ctx.locks.forget(id).await;
        self.ctx.presentation.dispatch(PresentationCommand::SetBlock {
            location: generator.location.clone(),
            block: AIR.to_string(),
        });
        info!(generator_id = %id, owner = %actor, "generator removed");
        Ok(generator)
    }

    // Removes every generator of `owner` in one batch, wherever it is simulated.
    pub async fn remove_all(&self, owner: Uuid) -> Result<Vec<String>, MaintenanceError> {
        let removed = self.ctx.repository.remove_all(&owner).await?;
        for id in &removed {
            self.ctx.cache.invalidate(id).await;
            self.ctx.locks.forget(id).await;
            if let Some(location) = Location::parse(id) {
                self.ctx.presentation.dispatch(PresentationCommand::SetBlock {
                    location,
                    block: AIR.to_string(),
                });
            }
        }
        info!(owner = %owner, count = removed.len(), "removed all generators");
        Ok(removed)
    }

    pub async fn fix(&self, actor: Uuid, id: &str) -> Result<ActiveGenerator, MaintenanceError> {
        let mut generator = self.lease(id).await?;
        if generator.owner != actor {
            return Err(MaintenanceError::NotOwner);
        }
        if !generator.corrupted {
            return Err(MaintenanceError::NotCorrupted);
        }
        let cost = self.gen_type(&generator.generator_id)?.fix_cost;

        self.charge(actor, cost).await?;
        generator.corrupted = false;
        if let Err(err) = self.store_fix(&generator).await {
            self.refund(actor, cost).await;
            return Err(err);
        }
        self.cashback(actor, cost).await;

        self.ctx.presentation.dispatch(PresentationCommand::Visual {
            location: generator.location.clone(),
            label: LABEL_GENERATOR_FIXED.to_string(),
            placeholders: placeholders([("cost", format_money(cost))]),
        });
        info!(generator_id = %id, owner = %actor, cost, "generator fixed");
        Ok(generator)
    }

    pub async fn upgrade(&self, actor: Uuid, id: &str) -> Result<ActiveGenerator, MaintenanceError> {
        let generator = self.lease(id).await?;
        if generator.owner != actor {
            return Err(MaintenanceError::NotOwner);
        }
        let current = self.gen_type(&generator.generator_id)?;
        let next = self
            .ctx
            .catalog
            .next_tier(current)
            .ok_or(MaintenanceError::NoUpgrade)?;
        let cost = current.cost;

        self.charge(actor, cost).await?;
        let upgraded = ActiveGenerator {
            generator_id: next.id.clone(),
            ..generator
        };
        if let Err(err) = self.ctx.repository.register(&upgraded).await {
            self.refund(actor, cost).await;
            return Err(err.into());
        }
        self.ctx.cache.insert(upgraded.clone()).await;
        self.cashback(actor, cost).await;

        self.ctx.presentation.dispatch(PresentationCommand::SetBlock {
            location: upgraded.location.clone(),
            block: next.block.clone(),
        });
        self.ctx.presentation.dispatch(PresentationCommand::Visual {
            location: upgraded.location.clone(),
            label: LABEL_GENERATOR_UPGRADED.to_string(),
            placeholders: placeholders([
                ("previous", current.display_name.clone()),
                ("current", next.display_name.clone()),
                ("cost", format_money(cost)),
            ]),
        });
        info!(generator_id = %id, owner = %actor, from = %current.id, to = %next.id, "generator upgraded");
        Ok(upgraded)
    }

    // Puts the blocks of every stored generator in `world` back after the world loads.
    // `found` maps generator ids to the block currently at their location.
    pub async fn restore_world(
        &self,
        world: &str,
        found: &HashMap<String, String>,
    ) -> Result<RestoreReport, StoreError> {
        let mut ids: Vec<String> = self.ctx.repository.ids_by_world(world).await?.into_iter().collect();
        ids.sort();
        let mut report = RestoreReport::default();

        for id in ids {
            let Some(generator) = self.ctx.repository.get(&id).await? else {
                continue;
            };
            let Some(gen_type) = self.ctx.catalog.get(&generator.generator_id) else {
                report.skipped += 1;
                continue;
            };
            let block = found.get(&id).map(String::as_str);
            let safety = block.map_or(PlacementSafety::Unsafe, |block| {
                classify(block, &gen_type.block)
            });

            if self.restore.safe_restoration && safety == PlacementSafety::Unsafe {
                warn!(generator_id = %id, block = block.unwrap_or("unknown"), "location not safe; generator not restored");
                report.skipped += 1;
                if self.restore.cleanup_orphaned {
                    self.ctx.repository.unregister(&id).await?;
                    self.ctx.cache.invalidate(&id).await;
                    self.ctx.locks.forget(&id).await;
                    report.purged += 1;
                }
                continue;
            }

            if block != Some(gen_type.block.as_str()) {
                self.ctx.presentation.dispatch(PresentationCommand::SetBlock {
                    location: generator.location.clone(),
                    block: gen_type.block.clone(),
                });
            }
            report.restored += 1;
        }

        if report.restored > 0 || report.skipped > 0 {
            info!(
                world,
                restored = report.restored,
                skipped = report.skipped,
                purged = report.purged,
                "world generators restored"
            );
        }
        Ok(report)
    }

    // Current copy of a generator whose lease this process holds, acquiring it when free.
    async fn lease(&self, id: &str) -> Result<ActiveGenerator, MaintenanceError> {
        if self.ctx.locks.holds_locally(id).await {
            return self
                .ctx
                .cache
                .get(id)
                .await?
                .ok_or(MaintenanceError::NotFound);
        }
        if self.ctx.repository.get(id).await?.is_none() {
            return Err(MaintenanceError::NotFound);
        }
        if !self.ctx.locks.acquire(id).await? {
            return Err(MaintenanceError::HeldElsewhere);
        }
        match self.ctx.cache.load(id).await? {
            Some(generator) => Ok(generator),
            None => {
                // Removed between the check and the acquire.
                if let Err(err) = self.ctx.locks.release(id).await {
                    warn!(generator_id = %id, error = %err, "lease release failed; it will expire");
                }
                Err(MaintenanceError::NotFound)
            }
        }
    }

    // The write only lands on an existing record; a record removed meanwhile is reported missing.
    async fn store_fix(&self, generator: &ActiveGenerator) -> Result<(), MaintenanceError> {
        let id = generator.id();
        self.ctx.cache.persist(generator).await?;
        if self.ctx.repository.get(&id).await?.is_none() {
            self.ctx.cache.invalidate(&id).await;
            self.ctx.locks.forget(&id).await;
            return Err(MaintenanceError::NotFound);
        }
        Ok(())
    }

    // Gives back a payment whose purchase did not go through.
    async fn refund(&self, player: Uuid, cost: f64) {
        if cost <= 0.0 {
            return;
        }
        match self.economy.deposit(player, cost).await {
            Ok(()) => info!(player = %player, cost, "maintenance payment refunded"),
            Err(err) => error!(player = %player, cost, error = %err, "refund failed"),
        }
    }

    async fn charge(&self, player: Uuid, cost: f64) -> Result<(), MaintenanceError> {
        if cost <= 0.0 {
            return Ok(());
        }
        let balance = self.economy.balance(player).await?;
        if balance < cost {
            return Err(MaintenanceError::NotEnoughMoney { balance, cost });
        }
        self.economy.withdraw(player, cost).await?;
        Ok(())
    }

    async fn cashback(&self, player: Uuid, spent: f64) {
        if spent <= 0.0 {
            return;
        }
        if let Err(err) = self.economy.cashback(player, spent).await {
            warn!(player = %player, error = %err, "cashback failed");
        }
    }

    fn gen_type(&self, id: &str) -> Result<&GeneratorType, MaintenanceError> {
        self.ctx
            .catalog
            .get(id)
            .ok_or_else(|| MaintenanceError::UnknownType(id.to_string()))
    }
}

fn format_money(amount: f64) -> String {
    format!("{amount:.2}")
}
