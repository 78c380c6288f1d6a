use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::{EconomyError, StoreError};
use crate::domain::event::GlobalEvent;
use crate::domain::generator::{ActiveGenerator, GeneratorDrop};
use crate::domain::presence::PresenceSnapshot;
use crate::domain::presentation::PresentationCommand;
use crate::domain::user::UserProfile;

// One operation inside an all-or-nothing store batch.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchOp {
    Set { key: String, value: String },
    // Overwrites only an existing value, so write-backs never resurrect a deleted record.
    SetIfPresent { key: String, value: String },
    Delete { key: String },
    SetAdd { key: String, member: String },
    SetRemove { key: String, member: String },
    Increment { key: String, by: i64 },
    // Removes `member` from `key` only if the set at `guard` is empty at this point of the batch.
    SetRemoveIfEmpty {
        key: String,
        member: String,
        guard: String,
    },
}

// Port for the shared key-value store every process coordinates through.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError>;
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;
    async fn set_members(&self, key: &str) -> Result<HashSet<String>, StoreError>;
    async fn set_len(&self, key: &str) -> Result<usize, StoreError>;

    async fn increment(&self, key: &str, by: i64) -> Result<i64, StoreError>;

    // Atomic create-if-absent with expiry. An expired value counts as absent.
    async fn set_if_absent_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;
    // Atomic expiry refresh, applied only while the live value equals `expected`.
    async fn refresh_expiry_if_equals(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;
    // Atomic check-and-delete.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    // Number of live string keys starting with `prefix`.
    async fn count_prefix(&self, prefix: &str) -> Result<usize, StoreError>;

    async fn execute_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError>;
}

// Port for retrieving the current time.
pub trait Clock: Send + Sync {
    fn now_epoch_seconds(&self) -> u64;
}

// Port exposing online players and loaded worlds of this process.
pub trait PresenceSource: Send + Sync {
    fn snapshot(&self) -> Arc<PresenceSnapshot>;
}

// Port exposing the currently active global event, if any.
pub trait EventSource: Send + Sync {
    fn active_event(&self) -> Option<GlobalEvent>;
}

// Port for player-visible side effects. Must never block the caller.
pub trait Presentation: Send + Sync {
    fn dispatch(&self, command: PresentationCommand);
}

// Port for the economy service.
#[async_trait]
pub trait Economy: Send + Sync {
    async fn balance(&self, player: Uuid) -> Result<f64, EconomyError>;
    async fn withdraw(&self, player: Uuid, amount: f64) -> Result<(), EconomyError>;
    async fn deposit(&self, player: Uuid, amount: f64) -> Result<(), EconomyError>;
    // Refund hook after a paid action; the economy decides the refunded share.
    async fn cashback(&self, player: Uuid, spent: f64) -> Result<(), EconomyError>;
}

// Port for selling a generated drop instead of placing it in the world.
pub trait AutoSell: Send + Sync {
    fn sell(&self, profile: &UserProfile, world: &str, drop: &GeneratorDrop, quantity: u32) -> bool;
}

// Drop about to be produced by a generator. Hooks may alter or cancel it.
#[derive(Clone, Debug)]
pub struct GenerateEvent {
    pub generator: ActiveGenerator,
    pub generator_type_id: String,
    pub drop: Option<GeneratorDrop>,
    pub quantity: u32,
    pub cancelled: bool,
}

// Extension points invoked by the simulation and corruption passes.
pub trait GeneratorHook: Send + Sync {
    fn on_generate(&self, _event: &mut GenerateEvent) {}

    // Returning false vetoes the corruption.
    fn on_corrupt(&self, _generator: &ActiveGenerator) -> bool {
        true
    }
}
