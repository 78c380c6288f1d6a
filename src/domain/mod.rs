pub mod errors;
pub mod event;
pub mod generator;
pub mod keys;
pub mod placement;
pub mod ports;
pub mod presence;
pub mod presentation;
pub mod user;
pub mod world;

pub use errors::{EconomyError, MaintenanceError, StoreError};
pub use event::{EventKind, EventModifier, GlobalEvent};
pub use generator::{
    ActiveGenerator, ChunkPos, GeneratorCatalog, GeneratorDrop, GeneratorType, Location,
};
pub use keys::KeySpace;
pub use presence::PresenceSnapshot;
pub use presentation::PresentationCommand;
pub use user::UserProfile;
pub use world::{WorldMultipliers, WorldRules};
