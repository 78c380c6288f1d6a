use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::domain::generator::{ChunkPos, Location};

// Which players are online and which worlds/chunks are loaded on this process.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    #[serde(default)]
    pub online: HashSet<Uuid>,
    /// Loaded worlds. `None` means every chunk of that world counts as loaded.
    #[serde(default)]
    pub worlds: HashMap<String, Option<HashSet<ChunkPos>>>,
}

impl PresenceSnapshot {
    pub fn is_online(&self, player: &Uuid) -> bool {
        self.online.contains(player)
    }

    pub fn is_world_loaded(&self, world: &str) -> bool {
        self.worlds.contains_key(world)
    }

    pub fn is_loaded(&self, location: &Location) -> bool {
        match self.worlds.get(&location.world) {
            Some(None) => true,
            Some(Some(chunks)) => chunks.contains(&location.chunk()),
            None => false,
        }
    }

    pub fn loaded_worlds(&self) -> impl Iterator<Item = &str> {
        self.worlds.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_world_has_chunk_list_then_only_listed_chunks_are_loaded() {
        let mut snapshot = PresenceSnapshot::default();
        snapshot.worlds.insert(
            "world".to_string(),
            Some([ChunkPos { x: 0, z: 0 }].into_iter().collect()),
        );

        assert!(snapshot.is_loaded(&Location::new("world", 3, 64, 15)));
        assert!(!snapshot.is_loaded(&Location::new("world", 16, 64, 0)));
        assert!(!snapshot.is_loaded(&Location::new("nether", 0, 64, 0)));
    }

    #[test]
    fn when_world_has_no_chunk_list_then_every_chunk_is_loaded() {
        let mut snapshot = PresenceSnapshot::default();
        snapshot.worlds.insert("world".to_string(), None);

        assert!(snapshot.is_loaded(&Location::new("world", 10_000, 64, -10_000)));
    }
}
