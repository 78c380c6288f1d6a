use axum::extract::ws::Utf8Bytes;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

use crate::domain::ports::Clock;
use crate::interface_adapters::events::EventBoard;
use crate::interface_adapters::presence::PresenceBoard;
use crate::use_cases::{CorruptionTask, EngineContext, GeneratorMaintenance};

#[derive(Clone)]
pub struct AppState {
    // Shared engine components of this process.
    pub ctx: EngineContext,
    pub maintenance: Arc<GeneratorMaintenance>,
    // Read for the corruption countdown only; the scheduler drives its passes.
    pub corruption: Arc<CorruptionTask>,
    // Pushed by the game server.
    pub presence: Arc<PresenceBoard>,
    pub events: Arc<EventBoard>,
    // Serialized presentation commands, shared across all feed connections.
    pub feed_tx: broadcast::Sender<Utf8Bytes>,
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}
