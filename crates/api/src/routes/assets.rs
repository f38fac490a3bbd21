//! Route definitions for registered ledger assets.

use axum::routing::post;
use axum::Router;

use crate::handlers::assets;
use crate::state::AppState;

/// ```text
/// POST   /assets/{asset_id}/license-terms     -> attach_license_terms
/// POST   /assets/{asset_id}/licenses          -> purchase_license
/// POST   /assets/{asset_id}/royalties/pay     -> pay_royalty
/// POST   /assets/{asset_id}/royalties/claim   -> claim_royalty
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/assets/{asset_id}/license-terms",
            post(assets::attach_license_terms),
        )
        .route("/assets/{asset_id}/licenses", post(assets::purchase_license))
        .route("/assets/{asset_id}/royalties/pay", post(assets::pay_royalty))
        .route("/assets/{asset_id}/royalties/claim", post(assets::claim_royalty))
}
