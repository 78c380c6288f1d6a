use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::generator::Location;

// Labels the presentation layer maps to configured messages, particles and sounds.
pub const LABEL_CORRUPTION_BROADCAST: &str = "corruption.broadcast";
pub const LABEL_CORRUPTION_NOTIFY: &str = "corruption.notify";
pub const LABEL_CORRUPTION_SOUND: &str = "corruption.sound";
pub const LABEL_GENERATOR_FIXED: &str = "generator.fixed";
pub const LABEL_GENERATOR_UPGRADED: &str = "generator.upgraded";

pub type Placeholders = BTreeMap<String, String>;

// Side effects on player-visible state, applied in order on the foreground context.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresentationCommand {
    SpawnMarker {
        generator_id: String,
        location: Location,
    },
    RemoveMarker {
        generator_id: String,
    },
    DropItems {
        location: Location,
        item: String,
        amount: u32,
    },
    SetBlock {
        location: Location,
        block: String,
    },
    Broadcast {
        label: String,
        placeholders: Placeholders,
    },
    Notify {
        player: Uuid,
        label: String,
        placeholders: Placeholders,
    },
    PlaySound {
        player: Uuid,
        label: String,
    },
    Visual {
        location: Location,
        label: String,
        placeholders: Placeholders,
    },
}

pub fn placeholders<const N: usize>(pairs: [(&str, String); N]) -> Placeholders {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
