use std::sync::Arc;

use crate::domain::generator::GeneratorCatalog;
use crate::domain::ports::{EventSource, GeneratorHook, PresenceSource, Presentation};
use crate::domain::world::WorldRules;
use crate::use_cases::cache::GeneratorCache;
use crate::use_cases::generators::GeneratorRepository;
use crate::use_cases::locks::LockManager;
use crate::use_cases::users::UserRepository;

// Components shared by the periodic tasks and the maintenance flows of one process.
#[derive(Clone)]
pub struct EngineContext {
    pub catalog: Arc<GeneratorCatalog>,
    pub worlds: Arc<WorldRules>,
    pub repository: Arc<GeneratorRepository>,
    pub locks: Arc<LockManager>,
    pub cache: Arc<GeneratorCache>,
    pub users: Arc<UserRepository>,
    pub presence: Arc<dyn PresenceSource>,
    pub events: Arc<dyn EventSource>,
    pub presentation: Arc<dyn Presentation>,
    pub hooks: Vec<Arc<dyn GeneratorHook>>,
}
