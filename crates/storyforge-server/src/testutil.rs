// ABOUTME: Test helpers for the server crate: stub-backed app state construction.
// ABOUTME: Compiled only for tests.

use std::sync::Arc;

use storyforge_agent::client::{CompletionClient, CompletionResponse};
use storyforge_agent::testing::StubCompletionClient;
use storyforge_agent::tools::builtin_registry;
use storyforge_agent::{Agent, Swarm};
use storyforge_core::config::{RunConfig, default_roster};

use crate::app_state::{AppState, SharedState};

/// App state wired to a stub completion client replaying the given script.
pub fn test_state(script: Vec<CompletionResponse>) -> SharedState {
    let roster = default_roster();
    let agents: Vec<Agent> = roster
        .iter()
        .map(|config| Agent::from_config(config, "stub-model"))
        .collect();
    let client: Arc<dyn CompletionClient> = Arc::new(StubCompletionClient::with_script(script));
    let swarm = Swarm::new(agents, builtin_registry(&roster), client).expect("valid test roster");
    Arc::new(AppState::new(
        Arc::new(swarm),
        RunConfig::default(),
        "stub-model".to_string(),
        None,
    ))
}
