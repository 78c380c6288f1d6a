use std::sync::Arc;
use tokio::sync::watch;

use crate::domain::ports::PresenceSource;
use crate::domain::presence::PresenceSnapshot;

// Latest online-player/loaded-world snapshot, replaced wholesale by the game server.
pub struct PresenceBoard {
    tx: watch::Sender<Arc<PresenceSnapshot>>,
}

impl Default for PresenceBoard {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(PresenceSnapshot::default()));
        Self { tx }
    }
}

impl PresenceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, snapshot: PresenceSnapshot) {
        self.tx.send_replace(Arc::new(snapshot));
    }
}

impl PresenceSource for PresenceBoard {
    fn snapshot(&self) -> Arc<PresenceSnapshot> {
        self.tx.borrow().clone()
    }
}
