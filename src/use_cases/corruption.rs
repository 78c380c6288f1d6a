// Periodic corruption of held generators and the owner reminder that follows it.

use rand::Rng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::errors::StoreError;
use crate::domain::generator::ActiveGenerator;
use crate::domain::presentation::{
    LABEL_CORRUPTION_BROADCAST, LABEL_CORRUPTION_NOTIFY, LABEL_CORRUPTION_SOUND,
    PresentationCommand, placeholders,
};
use crate::use_cases::context::EngineContext;

#[derive(Clone, Debug)]
pub struct CorruptionSettings {
    pub enabled: bool,
    /// Share of the held, healthy generators that become candidates each pass.
    pub percentage: f64,
    pub interval: Duration,
    pub notify_interval: Duration,
    /// Generator type ids that never corrupt.
    pub blacklisted_generators: HashSet<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CorruptionReport {
    pub pool: usize,
    pub selected: usize,
    pub corrupted: usize,
    pub vetoed: usize,
    pub failed: usize,
}

pub fn target_count(pool: usize, percentage: f64) -> usize {
    (pool as f64 * percentage.clamp(0.0, 100.0) / 100.0).floor() as usize
}

// Picks up to `target` distinct indices at random, skipping blacklisted or already
// corrupted entries, until enough are chosen or every index has been visited.
pub fn select_candidates<R: Rng + ?Sized>(
    pool: &[ActiveGenerator],
    target: usize,
    blacklist: &HashSet<String>,
    rng: &mut R,
) -> Vec<usize> {
    let mut visited = HashSet::new();
    let mut chosen = Vec::new();
    while chosen.len() < target && visited.len() < pool.len() {
        let index = rng.gen_range(0..pool.len());
        if !visited.insert(index) {
            continue;
        }
        let generator = &pool[index];
        if generator.corrupted || blacklist.contains(&generator.generator_id) {
            continue;
        }
        chosen.push(index);
    }
    chosen
}

// Percentage roll in [0, 100).
pub fn roll<R: Rng + ?Sized>(chance: f64, rng: &mut R) -> bool {
    chance > 0.0 && rng.gen_range(0.0..100.0) < chance
}

pub struct CorruptionTask {
    ctx: EngineContext,
    settings: CorruptionSettings,
    // Seconds counted since the last pass; advanced by `tick`.
    elapsed: AtomicU64,
    rng: Mutex<StdRng>,
}

impl CorruptionTask {
    pub fn new(ctx: EngineContext, settings: CorruptionSettings, rng: StdRng) -> Self {
        Self {
            ctx,
            settings,
            elapsed: AtomicU64::new(0),
            rng: Mutex::new(rng),
        }
    }

    // Called once per real second. Runs a pass when the configured interval is reached.
    pub async fn tick(&self) -> Option<CorruptionReport> {
        if !self.settings.enabled {
            return None;
        }
        let elapsed = self.elapsed.fetch_add(1, Ordering::Relaxed) + 1;
        if elapsed < self.settings.interval.as_secs() {
            return None;
        }
        self.elapsed.store(0, Ordering::Relaxed);
        Some(self.run_pass().await)
    }

    // None while corruption is disabled.
    pub fn seconds_until_next(&self) -> Option<u64> {
        if !self.settings.enabled {
            return None;
        }
        Some(
            self.settings
                .interval
                .as_secs()
                .saturating_sub(self.elapsed.load(Ordering::Relaxed)),
        )
    }

    pub async fn run_pass(&self) -> CorruptionReport {
        let pool = self.healthy_held().await;
        let target = target_count(pool.len(), self.settings.percentage);
        let selected = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            select_candidates(&pool, target, &self.settings.blacklisted_generators, &mut *rng)
        };
        let mut report = CorruptionReport {
            pool: pool.len(),
            selected: selected.len(),
            ..CorruptionReport::default()
        };

        for index in selected {
            let generator = &pool[index];
            let chance = self
                .ctx
                .catalog
                .get(&generator.generator_id)
                .map_or(0.0, |gen_type| gen_type.corrupt_chance);
            let hit = {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                roll(chance, &mut *rng)
            };
            if !hit {
                continue;
            }
            if !self.ctx.hooks.iter().all(|hook| hook.on_corrupt(generator)) {
                report.vetoed += 1;
                continue;
            }
            match self.corrupt(&generator.id()).await {
                Ok(true) => report.corrupted += 1,
                Ok(false) => {}
                Err(err) => {
                    report.failed += 1;
                    error!(generator_id = %generator.id(), error = %err, "failed to corrupt generator");
                }
            }
        }

        if report.corrupted > 0 {
            self.ctx.presentation.dispatch(PresentationCommand::Broadcast {
                label: LABEL_CORRUPTION_BROADCAST.to_string(),
                placeholders: placeholders([("amount", report.corrupted.to_string())]),
            });
            info!(
                corrupted = report.corrupted,
                candidates = report.selected,
                "corruption pass finished"
            );
        } else {
            debug!(candidates = report.selected, "corruption pass corrupted nothing");
        }
        report
    }

    async fn healthy_held(&self) -> Vec<ActiveGenerator> {
        let mut pool = Vec::new();
        for id in self.ctx.locks.held_ids().await {
            match self.ctx.cache.get(&id).await {
                Ok(Some(generator)) if !generator.corrupted => pool.push(generator),
                Ok(_) => {}
                Err(err) => warn!(generator_id = %id, error = %err, "skipping generator in corruption pass"),
            }
        }
        pool
    }

    // Flips the flag on the current cached copy. False when the lease or the record is gone.
    async fn corrupt(&self, id: &str) -> Result<bool, StoreError> {
        if !self.ctx.locks.holds(id).await? {
            self.ctx.locks.forget(id).await;
            self.ctx.cache.invalidate(id).await;
            return Ok(false);
        }
        let Some(mut current) = self.ctx.cache.get(id).await? else {
            return Ok(false);
        };
        if current.corrupted {
            return Ok(false);
        }
        current.corrupted = true;
        self.ctx.cache.persist(&current).await?;
        Ok(true)
    }
}

// Reminds online owners how many of their held generators are corrupted.
pub struct NotifyTask {
    ctx: EngineContext,
    enabled: bool,
}

impl NotifyTask {
    pub fn new(ctx: EngineContext, enabled: bool) -> Self {
        Self { ctx, enabled }
    }

    // Returns the number of owners notified.
    pub async fn run_pass(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        let presence = self.ctx.presence.snapshot();
        let mut tally: BTreeMap<Uuid, usize> = BTreeMap::new();
        for id in self.ctx.locks.held_ids().await {
            match self.ctx.cache.get(&id).await {
                Ok(Some(generator)) if generator.corrupted => {
                    *tally.entry(generator.owner).or_default() += 1;
                }
                Ok(_) => {}
                Err(err) => warn!(generator_id = %id, error = %err, "skipping generator in corruption reminder"),
            }
        }

        let mut notified = 0;
        for (owner, count) in tally {
            if !presence.is_online(&owner) {
                continue;
            }
            self.ctx.presentation.dispatch(PresentationCommand::Notify {
                player: owner,
                label: LABEL_CORRUPTION_NOTIFY.to_string(),
                placeholders: placeholders([("amount", count.to_string())]),
            });
            self.ctx.presentation.dispatch(PresentationCommand::PlaySound {
                player: owner,
                label: LABEL_CORRUPTION_SOUND.to_string(),
            });
            notified += 1;
        }
        notified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::generator::Location;
    use crate::domain::ports::GeneratorHook;
    use crate::use_cases::test_support::{TestEngine, place};
    use rand::SeedableRng;
    use std::sync::Arc;

    fn settings(percentage: f64) -> CorruptionSettings {
        CorruptionSettings {
            enabled: true,
            percentage,
            interval: Duration::from_secs(3),
            notify_interval: Duration::from_secs(60),
            blacklisted_generators: HashSet::new(),
        }
    }

    fn pool(size: usize, generator_id: &str) -> Vec<ActiveGenerator> {
        (0..size)
            .map(|x| {
                ActiveGenerator::new(
                    Uuid::nil(),
                    Location::new("world", x as i32, 64, 0),
                    generator_id,
                )
            })
            .collect()
    }

    struct Veto;

    impl GeneratorHook for Veto {
        fn on_corrupt(&self, _generator: &ActiveGenerator) -> bool {
            false
        }
    }

    #[test]
    fn when_percentage_applies_then_target_is_floored() {
        assert_eq!(target_count(10, 25.0), 2);
        assert_eq!(target_count(3, 50.0), 1);
        assert_eq!(target_count(0, 50.0), 0);
        assert_eq!(target_count(10, 150.0), 10);
    }

    #[test]
    fn when_selecting_then_indices_are_distinct_and_not_blacklisted() {
        let mut generators = pool(6, "coal");
        generators.extend(pool(4, "iron"));
        let blacklist = HashSet::from(["iron".to_string()]);
        let mut rng = StdRng::seed_from_u64(1);

        let chosen = select_candidates(&generators, 10, &blacklist, &mut rng);

        assert_eq!(chosen.len(), 6);
        let distinct: HashSet<usize> = chosen.iter().copied().collect();
        assert_eq!(distinct.len(), 6);
        assert!(chosen.iter().all(|index| generators[*index].generator_id == "coal"));
    }

    #[test]
    fn when_many_trials_run_then_corruption_rate_converges_to_product_of_chances() {
        let generators = pool(10_000, "coal");
        let mut rng = StdRng::seed_from_u64(42);

        let chosen = select_candidates(&generators, target_count(10_000, 50.0), &HashSet::new(), &mut rng);
        let corrupted = chosen.iter().filter(|_| roll(40.0, &mut rng)).count();

        assert_eq!(chosen.len(), 5_000);
        // Expected 2000, standard deviation ~35.
        assert!((1_825..=2_175).contains(&corrupted), "corrupted {corrupted}");
    }

    #[test]
    fn when_chance_is_zero_or_full_then_roll_is_certain() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!((0..1000).all(|_| !roll(0.0, &mut rng)));
        assert!((0..1000).all(|_| roll(100.0, &mut rng)));
    }

    #[tokio::test]
    async fn when_interval_is_reached_then_pass_runs_and_counter_resets() {
        let engine = TestEngine::new("server-a");
        let task = CorruptionTask::new(engine.ctx.clone(), settings(100.0), StdRng::seed_from_u64(1));

        assert_eq!(task.tick().await, None);
        assert_eq!(task.tick().await, None);
        assert_eq!(task.seconds_until_next(), Some(1));
        assert!(task.tick().await.is_some());
        assert_eq!(task.seconds_until_next(), Some(3));
    }

    #[tokio::test]
    async fn when_corruption_is_disabled_then_tick_never_runs() {
        let engine = TestEngine::new("server-a");
        let task = CorruptionTask::new(
            engine.ctx.clone(),
            CorruptionSettings {
                enabled: false,
                ..settings(100.0)
            },
            StdRng::seed_from_u64(1),
        );

        for _ in 0..10 {
            assert_eq!(task.tick().await, None);
        }
        assert_eq!(task.seconds_until_next(), None);
    }

    #[tokio::test]
    async fn when_pass_runs_at_full_rates_then_every_held_generator_corrupts_and_is_announced() {
        let engine = TestEngine::new("server-a");
        let owner = Uuid::new_v4();
        let first = place(&engine, owner, "world", 1).await;
        let second = place(&engine, owner, "world", 2).await;
        let unheld = place(&engine, owner, "world", 3).await;
        engine.own(&first).await;
        engine.own(&second).await;
        let task = CorruptionTask::new(engine.ctx.clone(), settings(100.0), StdRng::seed_from_u64(1));

        let report = task.run_pass().await;

        assert_eq!(report.corrupted, 2);
        for generator in [&first, &second] {
            let stored = engine.ctx.repository.get(&generator.id()).await.unwrap().unwrap();
            assert!(stored.corrupted);
        }
        let untouched = engine.ctx.repository.get(&unheld.id()).await.unwrap().unwrap();
        assert!(!untouched.corrupted);
        assert!(engine.presentation.commands().contains(&PresentationCommand::Broadcast {
            label: LABEL_CORRUPTION_BROADCAST.to_string(),
            placeholders: placeholders([("amount", "2".to_string())]),
        }));
    }

    #[tokio::test]
    async fn when_hook_vetoes_then_nothing_corrupts_and_nothing_is_announced() {
        let mut engine = TestEngine::new("server-a");
        engine.ctx.hooks.push(Arc::new(Veto));
        let generator = place(&engine, Uuid::new_v4(), "world", 1).await;
        engine.own(&generator).await;
        let task = CorruptionTask::new(engine.ctx.clone(), settings(100.0), StdRng::seed_from_u64(1));

        let report = task.run_pass().await;

        assert_eq!(report.vetoed, 1);
        assert_eq!(report.corrupted, 0);
        assert!(engine.presentation.commands().is_empty());
    }

    #[tokio::test]
    async fn when_corrupted_generators_exist_then_only_online_owners_are_notified() {
        let engine = TestEngine::new("server-a");
        let online = Uuid::new_v4();
        let offline = Uuid::new_v4();
        engine.presence.set_online(online, true);
        for (owner, x) in [(online, 1), (online, 2), (offline, 3)] {
            let mut generator = place(&engine, owner, "world", x).await;
            generator.corrupted = true;
            engine.ctx.repository.put(&generator).await.unwrap();
            engine.own(&generator).await;
        }

        let notified = NotifyTask::new(engine.ctx.clone(), true).run_pass().await;

        assert_eq!(notified, 1);
        assert_eq!(
            engine.presentation.commands(),
            vec![
                PresentationCommand::Notify {
                    player: online,
                    label: LABEL_CORRUPTION_NOTIFY.to_string(),
                    placeholders: placeholders([("amount", "2".to_string())]),
                },
                PresentationCommand::PlaySound {
                    player: online,
                    label: LABEL_CORRUPTION_SOUND.to_string(),
                },
            ]
        );
    }
}
