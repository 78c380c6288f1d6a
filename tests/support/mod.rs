#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use generator_server::domain::generator::{GeneratorCatalog, GeneratorDrop, GeneratorType};
use generator_server::domain::ports::{
    AutoSell, Clock, GeneratorHook, KeyValueStore, Presentation,
};
use generator_server::domain::presentation::PresentationCommand;
use generator_server::domain::user::UserProfile;
use generator_server::domain::world::{WorldMultipliers, WorldRules};
use generator_server::domain::keys::KeySpace;
use generator_server::interface_adapters::events::EventBoard;
use generator_server::interface_adapters::memory_store::InMemoryStore;
use generator_server::interface_adapters::presence::PresenceBoard;
use generator_server::use_cases::hooks::WorldDropMultiplier;
use generator_server::use_cases::{
    EngineContext, GeneratorCache, GeneratorRepository, LockManager, UserRepository,
};

pub const LEASE_TTL: Duration = Duration::from_secs(30);

pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }

    pub fn advance(&self, seconds: u64) {
        self.0.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_epoch_seconds(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingPresentation(Mutex<Vec<PresentationCommand>>);

impl RecordingPresentation {
    pub fn commands(&self) -> Vec<PresentationCommand> {
        self.0.lock().unwrap().clone()
    }

    // Total amount of every item-drop command.
    pub fn dropped_amount(&self) -> u32 {
        self.commands()
            .iter()
            .map(|command| match command {
                PresentationCommand::DropItems { amount, .. } => *amount,
                _ => 0,
            })
            .sum()
    }
}

impl Presentation for RecordingPresentation {
    fn dispatch(&self, command: PresentationCommand) {
        self.0.lock().unwrap().push(command);
    }
}

// Auto-sell collaborator that never sells.
pub struct NoAutoSell;

impl AutoSell for NoAutoSell {
    fn sell(&self, _profile: &UserProfile, _world: &str, _drop: &GeneratorDrop, _quantity: u32) -> bool {
        false
    }
}

pub fn generator_type(id: &str, interval: f64, next_tier: Option<&str>) -> GeneratorType {
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
            sell_price: None,
        }],
    }
}

pub fn world_rules(world: &str, speed_multiplier: f64, drop_multiplier: u32) -> WorldRules {
    WorldRules::new(HashMap::from([(
        world.to_string(),
        WorldMultipliers {
            speed_multiplier,
            drop_multiplier,
            sell_multiplier: 0.0,
        },
    )]))
}

// One simulated process. Processes built from the same store and clock coordinate
// exactly like separate servers sharing one remote store.
pub struct Process {
    pub ctx: EngineContext,
    pub presence: Arc<PresenceBoard>,
    pub events: Arc<EventBoard>,
    pub presentation: Arc<RecordingPresentation>,
}

pub fn shared_store(clock: Arc<ManualClock>) -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new(clock))
}

pub fn process(
    server_id: &str,
    store: Arc<InMemoryStore>,
    clock: Arc<ManualClock>,
    catalog: GeneratorCatalog,
    worlds: WorldRules,
) -> Process {
    process_on(server_id, store, clock, catalog, worlds)
}

// Same as `process`, over any store (e.g. a wrapper around the shared one).
pub fn process_on(
    server_id: &str,
    shared: Arc<dyn KeyValueStore>,
    clock: Arc<ManualClock>,
    catalog: GeneratorCatalog,
    worlds: WorldRules,
) -> Process {
    let keys = KeySpace::default();
    let repository = Arc::new(GeneratorRepository::new(shared.clone(), keys.clone()));
    let worlds = Arc::new(worlds);
    let presence = Arc::new(PresenceBoard::new());
    let events = Arc::new(EventBoard::new(clock.clone()));
    let presentation = Arc::new(RecordingPresentation::default());
    let hooks: Vec<Arc<dyn GeneratorHook>> =
        vec![Arc::new(WorldDropMultiplier::new(worlds.clone()))];
    let ctx = EngineContext {
        catalog: Arc::new(catalog),
        worlds,
        repository: repository.clone(),
        locks: Arc::new(LockManager::new(
            shared.clone(),
            keys.clone(),
            clock,
            server_id,
            LEASE_TTL,
        )),
        cache: Arc::new(GeneratorCache::new(repository)),
        users: Arc::new(UserRepository::new(shared, keys)),
        presence: presence.clone(),
        events: events.clone(),
        presentation: presentation.clone(),
        hooks,
    };
    Process {
        ctx,
        presence,
        events,
        presentation,
    }
}
