//! Handlers for licensing and royalties on registered assets.
//!
//! Every call is a single ledger transaction signed by `signer`.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use taleforge_core::license::LicenseConfig;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AttachTermsBody {
    #[serde(default)]
    pub signer: Option<String>,
    #[serde(default)]
    pub license: LicenseConfig,
}

/// POST /api/v1/assets/{asset_id}/license-terms
pub async fn attach_license_terms(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
    Json(input): Json<AttachTermsBody>,
) -> AppResult<impl IntoResponse> {
    let outcome = state
        .licensing
        .attach_terms(&asset_id, input.signer.as_deref(), input.license)
        .await?;
    Ok(Json(DataResponse { data: outcome }))
}

fn default_amount() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct PurchaseBody {
    #[serde(default)]
    pub signer: Option<String>,
    pub license_terms_id: String,
    #[serde(default = "default_amount")]
    pub amount: u32,
    #[serde(default)]
    pub receiver: Option<String>,
}

/// POST /api/v1/assets/{asset_id}/licenses
pub async fn purchase_license(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
    Json(input): Json<PurchaseBody>,
) -> AppResult<impl IntoResponse> {
    let outcome = state
        .licensing
        .purchase_license(
            &asset_id,
            input.signer.as_deref(),
            &input.license_terms_id,
            input.amount,
            input.receiver.as_deref(),
        )
        .await?;
    Ok(Json(DataResponse { data: outcome }))
}

#[derive(Debug, Deserialize)]
pub struct PayRoyaltyBody {
    #[serde(default)]
    pub signer: Option<String>,
    #[serde(default)]
    pub payer_asset_id: Option<String>,
    /// Decimal amount in the currency's smallest unit.
    pub amount: String,
}

/// POST /api/v1/assets/{asset_id}/royalties/pay
pub async fn pay_royalty(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
    Json(input): Json<PayRoyaltyBody>,
) -> AppResult<impl IntoResponse> {
    let amount: u128 = input.amount.trim().parse().map_err(|_| {
        AppError::BadRequest(format!(
            "amount must be a non-negative integer, got '{}'",
            input.amount
        ))
    })?;
    let outcome = state
        .licensing
        .pay_royalty(
            &asset_id,
            input.signer.as_deref(),
            input.payer_asset_id.as_deref(),
            amount,
        )
        .await?;
    Ok(Json(DataResponse { data: outcome }))
}

#[derive(Debug, Deserialize)]
pub struct ClaimRoyaltyBody {
    #[serde(default)]
    pub signer: Option<String>,
    #[serde(default)]
    pub snapshot_ids: Vec<String>,
}

/// POST /api/v1/assets/{asset_id}/royalties/claim
pub async fn claim_royalty(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
    Json(input): Json<ClaimRoyaltyBody>,
) -> AppResult<impl IntoResponse> {
    let outcome = state
        .licensing
        .claim_royalty(&asset_id, input.signer.as_deref(), input.snapshot_ids)
        .await?;
    Ok(Json(DataResponse { data: outcome }))
}
