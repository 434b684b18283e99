// ABOUTME: HTTP server for storyforge, exposing the optimize endpoint and tracker batch runs.
// ABOUTME: Uses Axum with shared swarm state; the core engine lives in storyforge-agent.

pub mod api;
pub mod app_state;
pub mod config;
pub mod routes;

#[cfg(test)]
mod testutil;

pub use app_state::{AppState, SharedState};
pub use config::ServerConfig;
pub use routes::create_router;
