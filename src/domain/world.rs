use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Per-world tuning. All values default to zero (no effect).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldMultipliers {
    /// Interval discount in percent of the generator interval.
    #[serde(default)]
    pub speed_multiplier: f64,
    /// Items added to every drop produced in this world.
    #[serde(default)]
    pub drop_multiplier: u32,
    /// Sell multiplier bonus for auto-sold drops.
    #[serde(default)]
    pub sell_multiplier: f64,
}

#[derive(Clone, Debug, Default)]
pub struct WorldRules {
    worlds: HashMap<String, WorldMultipliers>,
}

impl WorldRules {
    pub fn new(worlds: HashMap<String, WorldMultipliers>) -> Self {
        Self { worlds }
    }

    pub fn speed_discount(&self, world: &str) -> f64 {
        self.worlds
            .get(world)
            .map(|rules| rules.speed_multiplier.clamp(0.0, 100.0))
            .unwrap_or(0.0)
    }

    pub fn drop_bonus(&self, world: &str) -> u32 {
        self.worlds
            .get(world)
            .map(|rules| rules.drop_multiplier)
            .unwrap_or(0)
    }

    pub fn sell_multiplier(&self, world: &str) -> f64 {
        self.worlds
            .get(world)
            .map(|rules| rules.sell_multiplier)
            .unwrap_or(0.0)
    }
}
