// ABOUTME: Handler for single-story optimization requests.
// ABOUTME: Maps the swarm's response entity onto the HTTP response shape.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use storyforge_agent::swarm::CancelFlag;
use storyforge_core::message::{Message, PerformanceMetrics};

use crate::app_state::SharedState;

/// Request body for optimizing one user story.
#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub content: String,
    pub epic_context: Option<String>,
    pub story_context: Option<String>,
}

/// Response body: the original and optimized story plus run details.
#[derive(Debug, Serialize)]
pub struct OptimizeResponse {
    pub original: String,
    pub optimized: String,
    pub agent_interactions: Vec<Message>,
    pub model: String,
    pub performance_metrics: PerformanceMetrics,
}

/// POST /api/optimize - Run the swarm over one story.
pub async fn optimize_story(
    State(state): State<SharedState>,
    Json(req): Json<OptimizeRequest>,
) -> impl IntoResponse {
    tracing::info!(story = %req.content.chars().take(50).collect::<String>(), "optimize request");

    let result = state
        .swarm
        .optimize(
            &req.content,
            req.epic_context.as_deref(),
            req.story_context.as_deref(),
            state.run_config,
            &CancelFlag::new(),
        )
        .await;

    match result {
        Ok(response) => Json(OptimizeResponse {
            original: req.content,
            optimized: response.optimized,
            agent_interactions: response.agent_interactions,
            model: state.model.clone(),
            performance_metrics: response.performance_metrics,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "optimization run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
