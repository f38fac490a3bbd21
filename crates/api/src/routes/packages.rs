//! Route definitions for the `/packages` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::packages;
use crate::state::AppState;

/// ```text
/// GET    /packages/{id}              -> get_package
/// POST   /packages/{id}/visibility   -> set_visibility
/// POST   /packages/{id}/register     -> register_package
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/packages/{id}", get(packages::get_package))
        .route("/packages/{id}/visibility", post(packages::set_visibility))
        .route("/packages/{id}/register", post(packages::register_package))
}
