use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::info;

use crate::domain::event::GlobalEvent;
use crate::domain::ports::{Clock, EventSource};

#[derive(Clone, Debug)]
struct RunningEvent {
    event: GlobalEvent,
    ends_at: u64,
}

// Holds at most one time-limited global event.
pub struct EventBoard {
    clock: Arc<dyn Clock>,
    running: RwLock<Option<RunningEvent>>,
}

impl EventBoard {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            running: RwLock::new(None),
        }
    }

    // Replaces any running event.
    pub fn start(&self, event: GlobalEvent, duration: Duration) {
        let ends_at = self.clock.now_epoch_seconds() + duration.as_secs();
        info!(kind = ?event.kind, modifier = event.modifier, ends_at, "global event started");
        *self
            .running
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(RunningEvent { event, ends_at });
    }

    pub fn stop(&self) -> bool {
        self.running
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .is_some()
    }

    // Seconds left on the running event, if any.
    pub fn remaining_seconds(&self) -> Option<u64> {
        let now = self.clock.now_epoch_seconds();
        self.running
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .filter(|running| running.ends_at > now)
            .map(|running| running.ends_at - now)
    }
}

impl EventSource for EventBoard {
    fn active_event(&self) -> Option<GlobalEvent> {
        let now = self.clock.now_epoch_seconds();
        self.running
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .filter(|running| running.ends_at > now)
            .map(|running| running.event.clone())
    }
}
