use std::sync::Arc;

use crate::domain::ports::{GenerateEvent, GeneratorHook};
use crate::domain::world::WorldRules;

// Adds the world's configured drop bonus to every generated drop.
pub struct WorldDropMultiplier {
    worlds: Arc<WorldRules>,
}

impl WorldDropMultiplier {
    pub fn new(worlds: Arc<WorldRules>) -> Self {
        Self { worlds }
    }
}

impl GeneratorHook for WorldDropMultiplier {
    fn on_generate(&self, event: &mut GenerateEvent) {
        let bonus = self.worlds.drop_bonus(&event.generator.location.world);
        event.quantity = event.quantity.saturating_add(bonus);
    }
}
