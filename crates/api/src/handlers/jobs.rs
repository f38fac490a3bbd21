//! Handlers for narrative jobs and their progress streams.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use taleforge_core::package::ModelChoice;
use taleforge_core::types::PackageId;
use taleforge_pipeline::progress_channel::subscribe_progress;
use taleforge_pipeline::CreateJob;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::sse::job_event_stream;
use crate::state::AppState;

/// Body of `POST /api/v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub text: String,
    pub user_id: String,
    #[serde(default)]
    pub model_choice: ModelChoice,
    #[serde(default)]
    pub creator_address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: PackageId,
}

/// POST /api/v1/jobs
///
/// Validate and queue a narrative. Returns 202 with the job id; progress is
/// available from `/jobs/{id}/events` and the result from `/packages/{id}`.
pub async fn create_job(
    State(state): State<AppState>,
    Json(input): Json<CreateJobRequest>,
) -> AppResult<impl IntoResponse> {
    let job_id = state
        .orchestrator
        .create_job(CreateJob {
            text: input.text,
            user_id: input.user_id,
            model_choice: input.model_choice,
            creator_address: input.creator_address,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: JobAccepted { job_id },
        }),
    ))
}

/// GET /api/v1/jobs/{id}/events
///
/// Server-Sent Events stream: `connected`, then `progress` events, then one
/// of `completed`, `failed` or `expired`.
pub async fn job_events(
    State(state): State<AppState>,
    Path(job_id): Path<PackageId>,
) -> AppResult<impl IntoResponse> {
    let receiver = subscribe_progress(
        state.store.clone(),
        state.progress.clone(),
        job_id,
        state.progress_lifetime(),
        state.shutdown.child_token(),
    )
    .await?;

    tracing::debug!(job_id = %job_id, "Progress stream opened");
    Ok(job_event_stream(receiver))
}
