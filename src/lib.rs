pub mod aggregate; // cross-collection read views
pub mod auth;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod models;
pub mod openapi;
pub mod rate_limit; // credential endpoint throttling
pub mod repo;
pub mod routes;
pub mod social;

// Re-export commonly used items for tests / external users
pub use config::Config;
pub use routes::{config as configure_routes, AppState};
