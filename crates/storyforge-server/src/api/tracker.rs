// ABOUTME: Handlers driving the background batch optimization over the issue tracker.
// ABOUTME: Walks epics to stories to sub-tasks, optimizing and updating each description.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use storyforge_agent::swarm::SwarmError;
use storyforge_tracker::{Issue, TrackerClient, TrackerError};

use crate::app_state::{BatchState, BatchStatus, SharedState};

#[derive(Debug, thiserror::Error)]
enum BatchError {
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Swarm(#[from] SwarmError),
}

struct WorkItem {
    subtask: Issue,
    epic_description: String,
    story_description: String,
}

/// POST /api/tracker/optimize - Start the batch run in the background.
pub async fn start_batch(State(state): State<SharedState>) -> impl IntoResponse {
    let Some(tracker) = state.tracker.clone() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "issue tracker is not configured" })),
        )
            .into_response();
    };

    {
        let mut status = state.batch_status.write().await;
        if status.status == BatchState::Processing {
            return (
                StatusCode::CONFLICT,
                Json(serde_json::json!({ "error": "a batch run is already processing" })),
            )
                .into_response();
        }
        *status = BatchStatus {
            total_stories: 0,
            processed_stories: 0,
            status: BatchState::Processing,
        };
    }

    state.batch_cancel.reset();
    tokio::spawn(run_batch(Arc::clone(&state), tracker));

    Json(serde_json::json!({
        "message": "tracker optimization started in the background"
    }))
    .into_response()
}

/// POST /api/tracker/stop - Ask the running batch to stop cooperatively.
pub async fn stop_batch(State(state): State<SharedState>) -> impl IntoResponse {
    state.batch_cancel.cancel();
    Json(serde_json::json!({ "message": "stop signal sent" }))
}

/// GET /api/tracker/status - Progress of the current or last batch run.
pub async fn batch_status(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.batch_status.read().await.clone())
}

async fn run_batch(state: SharedState, tracker: Arc<TrackerClient>) {
    let outcome = process_all(&state, &tracker).await;
    let mut status = state.batch_status.write().await;
    status.status = match outcome {
        Ok(true) => {
            tracing::info!(processed = status.processed_stories, "batch run completed");
            BatchState::Completed
        }
        Ok(false) => {
            tracing::info!(processed = status.processed_stories, "batch run stopped by caller");
            BatchState::Stopped
        }
        Err(e) => {
            tracing::error!(error = %e, "batch run failed");
            BatchState::Failed
        }
    };
}

/// Walk the tracker hierarchy and optimize every sub-task description.
/// Returns Ok(true) when the whole batch finished, Ok(false) when stopped.
async fn process_all(
    state: &SharedState,
    tracker: &TrackerClient,
) -> Result<bool, BatchError> {
    let mut work = Vec::new();
    for epic in tracker.fetch_epics().await? {
        for story in tracker.fetch_stories(&epic.key).await? {
            for subtask in tracker.fetch_subtasks(&story.key).await? {
                work.push(WorkItem {
                    subtask,
                    epic_description: epic.description.clone(),
                    story_description: story.description.clone(),
                });
            }
        }
    }
    state.batch_status.write().await.total_stories = work.len();
    tracing::info!(total = work.len(), "collected sub-tasks for batch optimization");

    for item in work {
        if state.batch_cancel.is_cancelled() {
            return Ok(false);
        }

        if item.subtask.description.trim().is_empty() {
            tracing::debug!(issue = %item.subtask.key, "skipping sub-task without description");
            state.batch_status.write().await.processed_stories += 1;
            continue;
        }

        let result = state
            .swarm
            .optimize(
                &item.subtask.description,
                Some(&item.epic_description),
                Some(&item.story_description),
                state.run_config,
                &state.batch_cancel,
            )
            .await;

        match result {
            Ok(response) => {
                tracker
                    .update_issue(&item.subtask.key, &response.optimized)
                    .await?;
            }
            Err(SwarmError::Cancelled) => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        state.batch_status.write().await.processed_stories += 1;
    }

    Ok(true)
}
