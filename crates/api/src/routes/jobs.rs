//! Route definitions for narrative jobs.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// ```text
/// POST   /jobs               -> create_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/jobs", post(jobs::create_job))
}

/// ```text
/// GET    /jobs/{id}/events   -> job_events (SSE)
/// ```
pub fn stream_router() -> Router<AppState> {
    Router::new().route("/jobs/{id}/events", get(jobs::job_events))
}
