use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Player profile persisted alongside generators.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub auto_sell_generators: bool,
    #[serde(default)]
    pub auto_sell_inventory: bool,
    /// Sell multiplier bonus applied on top of world multipliers.
    #[serde(default)]
    pub multiplier: f64,
    /// Auto-sell flush counter, advanced once per auto-sell tick.
    #[serde(default)]
    pub interval: u32,
}

impl UserProfile {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            auto_sell_generators: false,
            auto_sell_inventory: false,
            multiplier: 0.0,
            interval: 0,
        }
    }
}
