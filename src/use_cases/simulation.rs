// Fixed-step simulation of every generator this process holds a lease for.

use rand::rngs::StdRng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::domain::errors::StoreError;
use crate::domain::event::{EventModifier, GlobalEvent};
use crate::domain::generator::{ActiveGenerator, GeneratorDrop, GeneratorType, Location};
use crate::domain::ports::{AutoSell, GenerateEvent};
use crate::domain::presence::PresenceSnapshot;
use crate::domain::presentation::PresentationCommand;
use crate::use_cases::context::EngineContext;

#[derive(Clone, Debug)]
pub struct SimulationSettings {
    /// Simulated time added per pass; also the scheduling period.
    pub tick: Duration,
    /// Dirty cache entries are written back every this many passes (0 disables).
    pub save_every_ticks: u64,
    pub online_only: bool,
    pub blacklisted_worlds: HashSet<String>,
    /// Spawn a marker above corrupted generators.
    pub show_markers: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    // Missing instance or type, unloaded chunk, or blacklisted world.
    Skipped,
    // Online-only generator whose owner is offline; the timer keeps its value.
    Paused,
    Corrupted,
    Accumulating,
    Fired,
    Cancelled,
    LockLost,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub processed: usize,
    pub fired: usize,
    pub cancelled: usize,
    pub paused: usize,
    pub corrupted: usize,
    pub skipped: usize,
    pub lock_lost: usize,
    pub failed: usize,
    pub saved: usize,
}

impl PassReport {
    fn record(&mut self, outcome: TickOutcome) {
        match outcome {
            TickOutcome::Skipped => self.skipped += 1,
            TickOutcome::Paused => self.paused += 1,
            TickOutcome::Corrupted => self.corrupted += 1,
            TickOutcome::Accumulating => {}
            TickOutcome::Fired => self.fired += 1,
            TickOutcome::Cancelled => self.cancelled += 1,
            TickOutcome::LockLost => self.lock_lost += 1,
        }
    }
}

// Interval after the world discount and a speed event, both taken as a share of `base`.
pub fn effective_interval(base: f64, world_discount: f64, modifier: EventModifier) -> f64 {
    let mut interval = base;
    if world_discount > 0.0 {
        interval -= base * world_discount / 100.0;
    }
    if let EventModifier::Speed { percent } = modifier {
        interval -= base * percent / 100.0;
    }
    interval.max(0.0)
}

pub struct SimulationLoop {
    ctx: EngineContext,
    settings: SimulationSettings,
    auto_sell: Arc<dyn AutoSell>,
    // Ids with a corruption marker currently shown. Process-local.
    markers: Mutex<HashSet<String>>,
    rng: Mutex<StdRng>,
    passes: AtomicU64,
}

impl SimulationLoop {
    pub fn new(
        ctx: EngineContext,
        settings: SimulationSettings,
        auto_sell: Arc<dyn AutoSell>,
        rng: StdRng,
    ) -> Self {
        Self {
            ctx,
            settings,
            auto_sell,
            markers: Mutex::new(HashSet::new()),
            rng: Mutex::new(rng),
            passes: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    // One pass over the held set. Failures are logged per generator and never stop the pass.
    pub async fn run_pass(&self) -> PassReport {
        let presence = self.ctx.presence.snapshot();
        let event = self.ctx.events.active_event();
        let held = self.ctx.locks.held_ids().await;
        self.prune_markers(&held);

        let mut report = PassReport::default();
        for id in &held {
            report.processed += 1;
            match self.process(id, &presence, event.as_ref()).await {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    report.failed += 1;
                    error!(generator_id = %id, error = %err, "failed to tick generator");
                }
            }
        }

        let pass = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        if self.settings.save_every_ticks > 0 && pass % self.settings.save_every_ticks == 0 {
            let still_held = self.ctx.locks.held_ids().await;
            match self.ctx.cache.flush_ids(&still_held).await {
                Ok(saved) => report.saved = saved,
                Err(err) => error!(error = %err, "periodic generator save failed"),
            }
        }

        debug!(
            processed = report.processed,
            fired = report.fired,
            corrupted = report.corrupted,
            failed = report.failed,
            saved = report.saved,
            "simulation pass finished"
        );
        report
    }

    async fn process(
        &self,
        id: &str,
        presence: &PresenceSnapshot,
        event: Option<&GlobalEvent>,
    ) -> Result<TickOutcome, StoreError> {
        let Some(mut generator) = self.ctx.cache.get(id).await? else {
            return Ok(TickOutcome::Skipped);
        };
        let Some(base) = self.ctx.catalog.get(&generator.generator_id) else {
            return Ok(TickOutcome::Skipped);
        };
        let world = generator.location.world.clone();
        if !presence.is_loaded(&generator.location)
            || self.settings.blacklisted_worlds.contains(&world)
        {
            return Ok(TickOutcome::Skipped);
        }

        let online_only = base.online_only.unwrap_or(self.settings.online_only);
        if online_only && !presence.is_online(&generator.owner) {
            return Ok(TickOutcome::Paused);
        }

        if generator.corrupted {
            if self.settings.show_markers && self.markers().insert(id.to_string()) {
                self.ctx.presentation.dispatch(PresentationCommand::SpawnMarker {
                    generator_id: id.to_string(),
                    location: generator.location.clone(),
                });
            }
            return Ok(TickOutcome::Corrupted);
        }
        if self.markers().remove(id) {
            self.ctx.presentation.dispatch(PresentationCommand::RemoveMarker {
                generator_id: id.to_string(),
            });
        }

        let modifier = EventModifier::resolve(event, &base.id);
        let chosen = match modifier {
            EventModifier::TierUpgrade { steps } => self.ctx.catalog.upgraded(base, steps),
            EventModifier::MixedUp => self.random_type().unwrap_or(base),
            _ => base,
        };
        let interval =
            effective_interval(chosen.interval, self.ctx.worlds.speed_discount(&world), modifier);
        let extra = match modifier {
            EventModifier::DropMultiplier { extra } => extra,
            _ => 0,
        };

        generator.timer += self.settings.tick.as_secs_f64();
        if generator.timer < interval {
            self.ctx.cache.update(generator).await;
            return Ok(TickOutcome::Accumulating);
        }

        // Re-check against the store before the externally visible part.
        if !self.ctx.locks.holds(id).await? {
            self.ctx.locks.forget(id).await;
            self.ctx.cache.invalidate(id).await;
            warn!(generator_id = %id, "lease lost before drop; skipping");
            return Ok(TickOutcome::LockLost);
        }
        self.ctx.cache.persist(&generator).await?;

        let outcome = self.fire(&generator, chosen, extra).await;
        generator.timer = 0.0;
        self.ctx.cache.update(generator).await;
        Ok(outcome)
    }

    async fn fire(
        &self,
        generator: &ActiveGenerator,
        chosen: &GeneratorType,
        extra: u32,
    ) -> TickOutcome {
        let drop = self.pick_drop(chosen);
        let quantity = drop.as_ref().map_or(1, |drop| drop.amount) + extra;
        let mut event = GenerateEvent {
            generator: generator.clone(),
            generator_type_id: chosen.id.clone(),
            drop,
            quantity,
            cancelled: false,
        };
        for hook in &self.ctx.hooks {
            hook.on_generate(&mut event);
        }
        if event.cancelled {
            return TickOutcome::Cancelled;
        }
        let Some(drop) = event.drop else {
            return TickOutcome::Cancelled;
        };

        if self.sold(generator, &drop, event.quantity).await {
            return TickOutcome::Fired;
        }
        let location = &generator.location;
        self.ctx.presentation.dispatch(PresentationCommand::DropItems {
            location: Location::new(location.world.clone(), location.x, location.y + 1, location.z),
            item: drop.item,
            amount: event.quantity,
        });
        TickOutcome::Fired
    }

    // Auto-sells when the owner enabled it. False means the drop should be placed instead.
    async fn sold(&self, generator: &ActiveGenerator, drop: &GeneratorDrop, quantity: u32) -> bool {
        match self.ctx.users.get(&generator.owner).await {
            Ok(Some(profile)) if profile.auto_sell_generators => {
                self.auto_sell
                    .sell(&profile, &generator.location.world, drop, quantity)
            }
            Ok(_) => false,
            Err(err) => {
                warn!(owner = %generator.owner, error = %err, "profile lookup failed; dropping items");
                false
            }
        }
    }

    // Removes every marker, e.g. on shutdown.
    pub fn clear_markers(&self) {
        let ids: Vec<String> = self.markers().drain().collect();
        for generator_id in ids {
            self.ctx
                .presentation
                .dispatch(PresentationCommand::RemoveMarker { generator_id });
        }
    }

    pub fn marker_count(&self) -> usize {
        self.markers().len()
    }

    fn prune_markers(&self, held: &[String]) {
        let held: HashSet<&str> = held.iter().map(String::as_str).collect();
        let stale: Vec<String> = {
            let mut markers = self.markers();
            let stale = markers
                .iter()
                .filter(|id| !held.contains(id.as_str()))
                .cloned()
                .collect::<Vec<_>>();
            for id in &stale {
                markers.remove(id);
            }
            stale
        };
        for generator_id in stale {
            self.ctx
                .presentation
                .dispatch(PresentationCommand::RemoveMarker { generator_id });
        }
    }

    fn pick_drop(&self, gen_type: &GeneratorType) -> Option<GeneratorDrop> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        gen_type.pick_drop(&mut *rng).cloned()
    }

    fn random_type(&self) -> Option<&GeneratorType> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        self.ctx.catalog.random(&mut *rng)
    }

    fn markers(&self) -> MutexGuard<'_, HashSet<String>> {
        self.markers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
