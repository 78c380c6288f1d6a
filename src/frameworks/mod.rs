// Frameworks: configuration, database bootstrap and process lifecycle.

pub mod config;
pub mod db;
pub mod server;
