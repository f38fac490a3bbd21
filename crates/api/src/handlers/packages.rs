//! Handlers for the `/packages` resource.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use taleforge_core::error::CoreError;
use taleforge_core::license::LicenseConfig;
use taleforge_core::package::Package;
use taleforge_core::types::PackageId;
use taleforge_pipeline::RegisterRequest;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

async fn find_package(state: &AppState, id: PackageId) -> AppResult<Package> {
    state
        .store
        .get(id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Package",
            id: id.to_string(),
        }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewerQuery {
    pub user_id: Option<String>,
}

/// GET /api/v1/packages/{id}?user_id=
///
/// The persisted package. Also the polling fallback once a progress stream
/// has expired. The raw narrative is only returned to the submitting user.
pub async fn get_package(
    State(state): State<AppState>,
    Path(id): Path<PackageId>,
    Query(viewer): Query<ViewerQuery>,
) -> AppResult<impl IntoResponse> {
    let mut package = find_package(&state, id).await?;
    if viewer.user_id.as_deref() != Some(package.record.user_id.as_str()) {
        package.record.text.clear();
    }
    Ok(Json(DataResponse { data: package }))
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub user_id: String,
    pub is_public: bool,
}

/// POST /api/v1/packages/{id}/visibility
///
/// Only the submitting user may change visibility.
pub async fn set_visibility(
    State(state): State<AppState>,
    Path(id): Path<PackageId>,
    Json(input): Json<VisibilityRequest>,
) -> AppResult<impl IntoResponse> {
    let package = find_package(&state, id).await?;
    if package.record.user_id != input.user_id {
        return Err(AppError::Core(CoreError::Forbidden(
            "Only the package owner can change its visibility".to_string(),
        )));
    }

    state.store.set_visibility(id, input.is_public).await?;
    tracing::info!(package_id = %id, is_public = input.is_public, "Package visibility changed");

    let updated = find_package(&state, id).await?;
    Ok(Json(DataResponse { data: updated }))
}

#[derive(Debug, Deserialize)]
pub struct RegisterPackageRequest {
    /// Connected wallet address.
    #[serde(default)]
    pub signer: Option<String>,
    #[serde(default)]
    pub license: LicenseConfig,
}

/// POST /api/v1/packages/{id}/register
pub async fn register_package(
    State(state): State<AppState>,
    Path(id): Path<PackageId>,
    Json(input): Json<RegisterPackageRequest>,
) -> AppResult<impl IntoResponse> {
    let outcome = state
        .registration
        .register(RegisterRequest {
            package_id: id,
            signer: input.signer,
            license: input.license,
        })
        .await?;
    Ok(Json(DataResponse { data: outcome }))
}
