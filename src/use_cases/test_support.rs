use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::{EconomyError, StoreError};
use crate::domain::event::GlobalEvent;
use crate::domain::generator::{
    ActiveGenerator, GeneratorCatalog, GeneratorDrop, GeneratorType, Location,
};
use crate::domain::keys::KeySpace;
use crate::domain::ports::{
    BatchOp, Clock, Economy, EventSource, KeyValueStore, PresenceSource, Presentation,
};
use crate::domain::presence::PresenceSnapshot;
use crate::domain::presentation::PresentationCommand;
use crate::domain::world::WorldRules;
use crate::interface_adapters::memory_store::InMemoryStore;
use crate::use_cases::cache::GeneratorCache;
use crate::use_cases::context::EngineContext;
use crate::use_cases::generators::GeneratorRepository;
use crate::use_cases::locks::LockManager;
use crate::use_cases::users::UserRepository;

// Shared adjustable time source for deterministic use-case tests.
pub(crate) struct ManualClock(AtomicU64);

impl ManualClock {
    pub(crate) fn new(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }

    pub(crate) fn advance(&self, seconds: u64) {
        self.0.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_epoch_seconds(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

pub(crate) fn memory_store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new(Arc::new(ManualClock::new(1_700_000_000))))
}

#[derive(Clone, Copy, Default)]
pub(crate) struct FailureFlags {
    pub get: bool,
    pub batch: bool,
    pub acquire: bool,
}

// Store wrapper that fails selected operations on demand.
pub(crate) struct FailingStore {
    inner: Arc<InMemoryStore>,
    failures: Mutex<FailureFlags>,
}

impl FailingStore {
    pub(crate) fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            failures: Mutex::new(FailureFlags::default()),
        }
    }

    pub(crate) fn with_failures(self, failures: FailureFlags) -> Self {
        self.set_failures(failures);
        self
    }

    pub(crate) fn set_failures(&self, failures: FailureFlags) {
        *self.failures.lock().expect("failures mutex poisoned") = failures;
    }

    fn flags(&self) -> FailureFlags {
        *self.failures.lock().expect("failures mutex poisoned")
    }
}

fn unavailable() -> StoreError {
    StoreError::Unavailable("connection refused".to_string())
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.flags().get {
            return Err(unavailable());
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.inner.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.inner.set_remove(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<HashSet<String>, StoreError> {
        self.inner.set_members(key).await
    }

    async fn set_len(&self, key: &str) -> Result<usize, StoreError> {
        self.inner.set_len(key).await
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        self.inner.increment(key, by).await
    }

    async fn set_if_absent_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        if self.flags().acquire {
            return Err(unavailable());
        }
        self.inner.set_if_absent_with_expiry(key, value, ttl).await
    }

    async fn refresh_expiry_if_equals(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.inner.refresh_expiry_if_equals(key, expected, ttl).await
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        self.inner.delete_if_equals(key, expected).await
    }

    async fn count_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        self.inner.count_prefix(prefix).await
    }

    async fn execute_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        if self.flags().batch {
            return Err(StoreError::TransactionAborted("commit failed".to_string()));
        }
        self.inner.execute_batch(ops).await
    }
}

// Presentation sink that keeps every dispatched command.
#[derive(Default)]
pub(crate) struct RecordingPresentation {
    commands: Mutex<Vec<PresentationCommand>>,
}

impl RecordingPresentation {
    pub(crate) fn commands(&self) -> Vec<PresentationCommand> {
        self.commands.lock().expect("commands mutex poisoned").clone()
    }

    pub(crate) fn clear(&self) {
        self.commands.lock().expect("commands mutex poisoned").clear();
    }
}

impl Presentation for RecordingPresentation {
    fn dispatch(&self, command: PresentationCommand) {
        self.commands
            .lock()
            .expect("commands mutex poisoned")
            .push(command);
    }
}

// Presence source with a replaceable snapshot.
#[derive(Default)]
pub(crate) struct StaticPresence(Mutex<Arc<PresenceSnapshot>>);

impl StaticPresence {
    pub(crate) fn with_world(world: &str) -> Self {
        let presence = Self::default();
        presence.load_world(world);
        presence
    }

    pub(crate) fn load_world(&self, world: &str) {
        let mut guard = self.0.lock().expect("presence mutex poisoned");
        let mut snapshot = (**guard).clone();
        snapshot.worlds.insert(world.to_string(), None);
        *guard = Arc::new(snapshot);
    }

    pub(crate) fn unload_world(&self, world: &str) {
        let mut guard = self.0.lock().expect("presence mutex poisoned");
        let mut snapshot = (**guard).clone();
        snapshot.worlds.remove(world);
        *guard = Arc::new(snapshot);
    }

    pub(crate) fn set_online(&self, player: Uuid, online: bool) {
        let mut guard = self.0.lock().expect("presence mutex poisoned");
        let mut snapshot = (**guard).clone();
        if online {
            snapshot.online.insert(player);
        } else {
            snapshot.online.remove(&player);
        }
        *guard = Arc::new(snapshot);
    }
}

impl PresenceSource for StaticPresence {
    fn snapshot(&self) -> Arc<PresenceSnapshot> {
        self.0.lock().expect("presence mutex poisoned").clone()
    }
}

// Event source returning whatever event the test installs.
#[derive(Default)]
pub(crate) struct StaticEvents(Mutex<Option<GlobalEvent>>);

impl StaticEvents {
    pub(crate) fn set(&self, event: Option<GlobalEvent>) {
        *self.0.lock().expect("event mutex poisoned") = event;
    }
}

impl EventSource for StaticEvents {
    fn active_event(&self) -> Option<GlobalEvent> {
        self.0.lock().expect("event mutex poisoned").clone()
    }
}

// In-memory wallet used by maintenance and auto-sell tests.
#[derive(Default)]
pub(crate) struct FakeEconomy {
    balances: Mutex<HashMap<Uuid, f64>>,
    pub(crate) cashbacks: Mutex<Vec<(Uuid, f64)>>,
    pub(crate) fail: Mutex<bool>,
}

impl FakeEconomy {
    pub(crate) fn with_balance(player: Uuid, balance: f64) -> Self {
        let economy = Self::default();
        economy
            .balances
            .lock()
            .expect("balances mutex poisoned")
            .insert(player, balance);
        economy
    }

    pub(crate) fn balance_of(&self, player: Uuid) -> f64 {
        self.balances
            .lock()
            .expect("balances mutex poisoned")
            .get(&player)
            .copied()
            .unwrap_or(0.0)
    }

    fn check(&self) -> Result<(), EconomyError> {
        if *self.fail.lock().expect("fail mutex poisoned") {
            return Err(EconomyError::Unavailable("economy offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Economy for FakeEconomy {
    async fn balance(&self, player: Uuid) -> Result<f64, EconomyError> {
        self.check()?;
        Ok(self.balance_of(player))
    }

    async fn withdraw(&self, player: Uuid, amount: f64) -> Result<(), EconomyError> {
        self.check()?;
        let mut balances = self.balances.lock().expect("balances mutex poisoned");
        *balances.entry(player).or_default() -= amount;
        Ok(())
    }

    async fn deposit(&self, player: Uuid, amount: f64) -> Result<(), EconomyError> {
        self.check()?;
        let mut balances = self.balances.lock().expect("balances mutex poisoned");
        *balances.entry(player).or_default() += amount;
        Ok(())
    }

    async fn cashback(&self, player: Uuid, spent: f64) -> Result<(), EconomyError> {
        self.check()?;
        self.cashbacks
            .lock()
            .expect("cashbacks mutex poisoned")
            .push((player, spent));
        Ok(())
    }
}

pub(crate) fn generator_type(id: &str, interval: f64, next_tier: Option<&str>) -> GeneratorType {
    GeneratorType {
        id: id.to_string(),
        display_name: id.to_string(),
        interval,
        block: format!("{id}_block"),
        cost: 100.0,
        next_tier: next_tier.map(str::to_string),
        fix_cost: 25.0,
        corrupt_chance: 100.0,
        online_only: None,
        drops: vec![GeneratorDrop {
            item: id.to_string(),
            weight: 1.0,
            amount: 1,
            sell_price: Some(2.0),
        }],
    }
}

// coal -> iron -> gold upgrade chain, 10s each.
pub(crate) fn tiered_catalog() -> Arc<GeneratorCatalog> {
    Arc::new(GeneratorCatalog::new(vec![
        generator_type("coal", 10.0, Some("iron")),
        generator_type("iron", 10.0, Some("gold")),
        generator_type("gold", 10.0, None),
    ]))
}

// One simulated process wired against an in-memory store.
pub(crate) struct TestEngine {
    pub(crate) ctx: EngineContext,
    pub(crate) store: Arc<InMemoryStore>,
    // What this process's components talk to; `store` unless wrapped.
    shared: Arc<dyn KeyValueStore>,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) presence: Arc<StaticPresence>,
    pub(crate) events: Arc<StaticEvents>,
    pub(crate) presentation: Arc<RecordingPresentation>,
}

impl TestEngine {
    pub(crate) fn new(server_id: &str) -> Self {
        Self::with_clock(server_id, Arc::new(ManualClock::new(1_700_000_000)))
    }

    pub(crate) fn with_clock(server_id: &str, clock: Arc<ManualClock>) -> Self {
        let store = Arc::new(InMemoryStore::new(clock.clone()));
        Self::build(
            server_id,
            store.clone(),
            store,
            clock,
            tiered_catalog(),
            Arc::new(WorldRules::default()),
            Arc::new(StaticPresence::with_world("world")),
        )
    }

    // Second process sharing this engine's store, clock and configuration.
    pub(crate) fn peer(&self, server_id: &str, presence: Arc<StaticPresence>) -> Self {
        Self::build(
            server_id,
            self.store.clone(),
            self.store.clone(),
            self.clock.clone(),
            self.ctx.catalog.clone(),
            self.ctx.worlds.clone(),
            presence,
        )
    }

    pub(crate) fn with_worlds(self, worlds: WorldRules) -> Self {
        Self::build(
            self.ctx.locks.server_id(),
            self.shared.clone(),
            self.store.clone(),
            self.clock.clone(),
            self.ctx.catalog.clone(),
            Arc::new(worlds),
            self.presence.clone(),
        )
    }

    pub(crate) fn with_catalog(self, catalog: GeneratorCatalog) -> Self {
        Self::build(
            self.ctx.locks.server_id(),
            self.shared.clone(),
            self.store.clone(),
            self.clock.clone(),
            Arc::new(catalog),
            self.ctx.worlds.clone(),
            self.presence.clone(),
        )
    }

    // Same process, talking to the shared store through `shared` (e.g. a `FailingStore`).
    pub(crate) fn with_store(self, shared: Arc<dyn KeyValueStore>) -> Self {
        Self::build(
            self.ctx.locks.server_id(),
            shared,
            self.store.clone(),
            self.clock.clone(),
            self.ctx.catalog.clone(),
            self.ctx.worlds.clone(),
            self.presence.clone(),
        )
    }

    fn build(
        server_id: &str,
        shared: Arc<dyn KeyValueStore>,
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        catalog: Arc<GeneratorCatalog>,
        worlds: Arc<WorldRules>,
        presence: Arc<StaticPresence>,
    ) -> Self {
        let keys = KeySpace::default();
        let repository = Arc::new(GeneratorRepository::new(shared.clone(), keys.clone()));
        let locks = Arc::new(LockManager::new(
            shared.clone(),
            keys.clone(),
            clock.clone(),
            server_id,
            Duration::from_secs(30),
        ));
        let events = Arc::new(StaticEvents::default());
        let presentation = Arc::new(RecordingPresentation::default());
        let ctx = EngineContext {
            catalog,
            worlds,
            repository: repository.clone(),
            locks,
            cache: Arc::new(GeneratorCache::new(repository)),
            users: Arc::new(UserRepository::new(shared.clone(), keys)),
            presence: presence.clone(),
            events: events.clone(),
            presentation: presentation.clone(),
            hooks: Vec::new(),
        };
        Self {
            ctx,
            store,
            shared,
            clock,
            presence,
            events,
            presentation,
        }
    }

    // Acquires the lease and caches the generator, as a lease scan would.
    pub(crate) async fn own(&self, generator: &ActiveGenerator) {
        assert!(
            self.ctx.locks.acquire(&generator.id()).await.unwrap(),
            "expected lease to be free"
        );
        self.ctx.cache.insert(generator.clone()).await;
    }
}

// Registers a coal generator at (x, 64, 0).
pub(crate) async fn place(engine: &TestEngine, owner: Uuid, world: &str, x: i32) -> ActiveGenerator {
    let generator = ActiveGenerator::new(owner, Location::new(world, x, 64, 0), "coal");
    engine.ctx.repository.register(&generator).await.unwrap();
    generator
}
