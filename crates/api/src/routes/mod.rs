pub mod assets;
pub mod health;
pub mod jobs;
pub mod packages;

use axum::Router;

use crate::state::AppState;

/// Build the request/response part of the `/api/v1` route tree.
///
/// ```text
/// /jobs                                   create (POST, 202)
///
/// /packages/{id}                          get
/// /packages/{id}/visibility               set visibility (POST, owner only)
/// /packages/{id}/register                 register as a ledger asset (POST)
///
/// /assets/{asset_id}/license-terms        attach license terms (POST)
/// /assets/{asset_id}/licenses             purchase license tokens (POST)
/// /assets/{asset_id}/royalties/pay        pay royalty (POST)
/// /assets/{asset_id}/royalties/claim      claim royalty (POST)
/// ```
///
/// Everything here runs under the request timeout.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(jobs::router())
        .merge(packages::router())
        .merge(assets::router())
}

/// Long-lived streaming routes, mounted outside the request timeout.
///
/// ```text
/// /jobs/{id}/events                       progress stream (SSE)
/// ```
pub fn stream_routes() -> Router<AppState> {
    jobs::stream_router()
}
