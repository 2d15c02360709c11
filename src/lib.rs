pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod identity;
pub mod models;
pub mod openapi;
pub mod ownership;
pub mod routes;
pub mod session;
pub mod sync;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use sync::Synchronizer;
