// Interface adapters: store implementations, HTTP API and the presentation feed.

pub mod clients;
pub mod events;
pub mod feed;
pub mod handlers;
pub mod memory_store;
pub mod postgres_store;
pub mod presence;
pub mod protocol;
pub mod routes;
pub mod state;
