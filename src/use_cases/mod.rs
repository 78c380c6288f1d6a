// Use cases layer: coordination, simulation and maintenance workflows.

pub mod autosell;
pub mod cache;
pub mod candidates;
pub mod context;
pub mod corruption;
pub mod generators;
pub mod hooks;
pub mod lock_acquirer;
pub mod locks;
pub mod maintenance;
pub mod scheduler;
pub mod simulation;
pub mod users;

#[cfg(test)]
pub(crate) mod test_support;

pub use autosell::{AutoSellBatcher, SellCalculator};
pub use cache::GeneratorCache;
pub use context::EngineContext;
pub use corruption::{CorruptionSettings, CorruptionTask, NotifyTask};
pub use generators::{GeneratorRepository, StoreStats};
pub use lock_acquirer::LockAcquirer;
pub use locks::LockManager;
pub use maintenance::{GeneratorMaintenance, RestoreSettings};
pub use scheduler::{BackgroundTasks, TaskHandle, spawn_periodic};
pub use simulation::{SimulationLoop, SimulationSettings};
pub use users::UserRepository;
