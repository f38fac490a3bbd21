use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// `postgres` or `memory`.
    pub store: &'static str,
    /// Whether the database is reachable. Absent for the in-memory store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_healthy: Option<bool>,
}

/// GET /health -- returns service and database health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = match &state.pool {
        Some(pool) => Some(taleforge_db::health_check(pool).await.is_ok()),
        None => None,
    };

    Json(HealthResponse {
        status: if db_healthy == Some(false) { "degraded" } else { "ok" },
        version: env!("CARGO_PKG_VERSION"),
        store: if state.pool.is_some() { "postgres" } else { "memory" },
        db_healthy,
    })
}

/// Mount health check routes (root level, not under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
