use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::event::GlobalEvent;
use crate::domain::generator::{ActiveGenerator, Location};

// Request payload for placing a generator.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub owner: Uuid,
    pub location: Location,
    pub generator_type: String,
}

// Request payload for any flow acting on one existing generator.
#[derive(Debug, Deserialize)]
pub struct GeneratorActionRequest {
    pub actor: Uuid,
    pub generator_id: String,
}

#[derive(Debug, Serialize)]
pub struct GeneratorResponse {
    pub generator: ActiveGenerator,
}

#[derive(Debug, Deserialize)]
pub struct RemoveAllRequest {
    pub owner: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RemoveAllResponse {
    pub removed: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub online: usize,
    pub worlds: usize,
}

// Starts `event` for `duration_seconds`, or stops the running event when `event` is null.
#[derive(Debug, Deserialize)]
pub struct ActiveEventRequest {
    pub event: Option<GlobalEvent>,
    #[serde(default)]
    pub duration_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct ActiveEventResponse {
    pub active: bool,
    pub remaining_seconds: Option<u64>,
}

// Blocks found at stored generator locations, keyed by generator id.
#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub world: String,
    #[serde(default)]
    pub found: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct UserSettingsRequest {
    pub player: Uuid,
    pub name: String,
    pub auto_sell_generators: Option<bool>,
    pub auto_sell_inventory: Option<bool>,
}

// Monitoring snapshot for this process and the shared store.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub server_id: String,
    pub generators: usize,
    pub owners: usize,
    pub worlds: usize,
    pub active_leases: usize,
    pub held_leases: usize,
    pub cached: usize,
    pub dirty: usize,
    pub corruption_in_seconds: Option<u64>,
}

// Simple error envelope for JSON responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}
