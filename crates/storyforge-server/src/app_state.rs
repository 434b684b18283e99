// ABOUTME: Shared application state for the storyforge HTTP server.
// ABOUTME: Holds the swarm, per-run config, tracker client, and the batch run status.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use storyforge_agent::swarm::{CancelFlag, Swarm};
use storyforge_core::config::RunConfig;
use storyforge_tracker::TrackerClient;

/// Lifecycle of the background tracker batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Idle,
    Processing,
    Completed,
    Stopped,
    Failed,
}

/// Progress snapshot of the tracker batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchStatus {
    pub total_stories: usize,
    pub processed_stories: usize,
    pub status: BatchState,
}

impl BatchStatus {
    pub fn idle() -> Self {
        Self {
            total_stories: 0,
            processed_stories: 0,
            status: BatchState::Idle,
        }
    }
}

/// Shared application state accessible by all Axum handlers.
pub struct AppState {
    pub swarm: Arc<Swarm>,
    pub run_config: RunConfig,
    pub model: String,
    pub tracker: Option<Arc<TrackerClient>>,
    /// Cooperative stop flag for the tracker batch run.
    pub batch_cancel: CancelFlag,
    pub batch_status: RwLock<BatchStatus>,
}

/// Type alias for the Arc-wrapped state used with Axum's State extractor.
pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        swarm: Arc<Swarm>,
        run_config: RunConfig,
        model: String,
        tracker: Option<Arc<TrackerClient>>,
    ) -> Self {
        Self {
            swarm,
            run_config,
            model,
            tracker,
            batch_cancel: CancelFlag::new(),
            batch_status: RwLock::new(BatchStatus::idle()),
        }
    }
}
