//! License terms, license purchases and royalties for registered assets.
//!
//! Each operation is a single gated ledger transaction. Gates are checked
//! before anything is submitted and nothing is retried.

use std::sync::Arc;

use taleforge_core::address::{is_valid_address, same_address, ZERO_ADDRESS};
use taleforge_core::license::{LicenseConfig, LicenseTerms};
use taleforge_core::store::PackageStore;
use taleforge_events::bus::LICENSE_TERMS_ATTACHED;
use taleforge_events::{EventBus, PlatformEvent};
use taleforge_providers::ledger::{
    AttachTermsRequest, ClaimRoyaltyRequest, LedgerClient, MintLicenseRequest, PayRoyaltyRequest,
};

use crate::config::LedgerConfig;
use crate::error::TransactionError;

/// Largest number of license tokens minted in one purchase.
pub const MAX_LICENSE_TOKENS: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum LicensingError {
    #[error("Connect a wallet first")]
    SignerNotConnected,

    #[error("An asset id is required")]
    MissingAssetId,

    #[error("Asset {0} does not exist on the ledger")]
    AssetNotFound(String),

    #[error("Only the asset owner can do this")]
    NotAssetOwner,

    #[error("Invalid license: {0}")]
    InvalidLicense(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Receiver {0} is not a valid address")]
    InvalidReceiver(String),

    #[error("At least one royalty snapshot is required")]
    MissingSnapshots,

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AttachTermsOutcome {
    pub tx_hash: String,
    pub license_terms_id: String,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PurchaseOutcome {
    pub tx_hash: String,
    pub license_token_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PaymentOutcome {
    pub tx_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ClaimOutcome {
    pub tx_hash: String,
    pub claimed_amount: Option<String>,
}

pub struct LicensingCoordinator {
    store: Arc<dyn PackageStore>,
    ledger: Arc<dyn LedgerClient>,
    events: Arc<EventBus>,
    config: LedgerConfig,
}

impl LicensingCoordinator {
    pub fn new(
        store: Arc<dyn PackageStore>,
        ledger: Arc<dyn LedgerClient>,
        events: Arc<EventBus>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            events,
            config,
        }
    }

    /// Attach new license terms. Owner only.
    pub async fn attach_terms(
        &self,
        asset_id: &str,
        signer: Option<&str>,
        license: LicenseConfig,
    ) -> Result<AttachTermsOutcome, LicensingError> {
        let signer = connected(signer)?;
        let asset_id = required_asset(asset_id)?;
        self.require_owner(asset_id, &signer).await?;

        let flavor = license
            .resolve()
            .map_err(|e| LicensingError::InvalidLicense(e.to_string()))?;
        let request = AttachTermsRequest {
            asset_id: asset_id.to_string(),
            terms: LicenseTerms {
                flavor,
                currency: self.config.currency_token.clone(),
            },
        };
        let receipt = self
            .ledger
            .attach_license_terms(&signer, &request)
            .await
            .map_err(transaction_failure)?;
        tracing::info!(
            asset_id,
            license_terms_id = %receipt.license_terms_id,
            flavor = flavor.name(),
            "License terms attached"
        );

        let warning = self.persist_terms(asset_id, &receipt.license_terms_id).await;
        self.events.publish(
            PlatformEvent::new(LICENSE_TERMS_ATTACHED)
                .with_source("asset", asset_id)
                .with_actor(signer)
                .with_payload(serde_json::json!({
                    "license_terms_id": receipt.license_terms_id,
                    "tx_hash": receipt.tx_hash,
                })),
        );

        Ok(AttachTermsOutcome {
            tx_hash: receipt.tx_hash,
            license_terms_id: receipt.license_terms_id,
            warning,
        })
    }

    /// Mint license tokens against existing terms. Anyone may buy; tokens
    /// go to `receiver`, or to the signer when unset.
    pub async fn purchase_license(
        &self,
        asset_id: &str,
        signer: Option<&str>,
        license_terms_id: &str,
        amount: u32,
        receiver: Option<&str>,
    ) -> Result<PurchaseOutcome, LicensingError> {
        let signer = connected(signer)?;
        let asset_id = required_asset(asset_id)?;
        if !(1..=MAX_LICENSE_TOKENS).contains(&amount) {
            return Err(LicensingError::InvalidAmount(format!(
                "license token amount must be between 1 and {MAX_LICENSE_TOKENS} (got {amount})"
            )));
        }
        if license_terms_id.trim().is_empty() {
            return Err(LicensingError::InvalidLicense(
                "license_terms_id is required".to_string(),
            ));
        }
        let receiver = match receiver {
            Some(r) if is_valid_address(r) => r.to_lowercase(),
            Some(r) => return Err(LicensingError::InvalidReceiver(r.to_string())),
            None => signer.clone(),
        };

        let request = MintLicenseRequest {
            licensor_asset_id: asset_id.to_string(),
            license_terms_id: license_terms_id.to_string(),
            amount,
            receiver,
        };
        let receipt = self
            .ledger
            .mint_license_tokens(&signer, &request)
            .await
            .map_err(transaction_failure)?;
        tracing::info!(asset_id, amount, tx_hash = %receipt.tx_hash, "License tokens minted");
        Ok(PurchaseOutcome {
            tx_hash: receipt.tx_hash,
            license_token_ids: receipt.license_token_ids,
        })
    }

    /// Pay royalties to an asset, optionally on behalf of another asset.
    pub async fn pay_royalty(
        &self,
        receiver_asset_id: &str,
        signer: Option<&str>,
        payer_asset_id: Option<&str>,
        amount: u128,
    ) -> Result<PaymentOutcome, LicensingError> {
        let signer = connected(signer)?;
        let receiver_asset_id = required_asset(receiver_asset_id)?;
        if amount == 0 {
            return Err(LicensingError::InvalidAmount(
                "royalty amount must be greater than zero".to_string(),
            ));
        }

        let request = PayRoyaltyRequest {
            receiver_asset_id: receiver_asset_id.to_string(),
            payer_asset_id: payer_asset_id
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(ZERO_ADDRESS)
                .to_string(),
            token: self.config.currency_token.clone(),
            amount,
        };
        let receipt = self
            .ledger
            .pay_royalty(&signer, &request)
            .await
            .map_err(transaction_failure)?;
        tracing::info!(receiver_asset_id, tx_hash = %receipt.tx_hash, "Royalty paid");
        Ok(PaymentOutcome {
            tx_hash: receipt.tx_hash,
        })
    }

    /// Claim accrued royalties. Owner only.
    pub async fn claim_royalty(
        &self,
        asset_id: &str,
        signer: Option<&str>,
        snapshot_ids: Vec<String>,
    ) -> Result<ClaimOutcome, LicensingError> {
        let signer = connected(signer)?;
        let asset_id = required_asset(asset_id)?;
        if snapshot_ids.is_empty() {
            return Err(LicensingError::MissingSnapshots);
        }
        self.require_owner(asset_id, &signer).await?;

        let request = ClaimRoyaltyRequest {
            asset_id: asset_id.to_string(),
            claimer: signer.clone(),
            snapshot_ids,
            token: self.config.currency_token.clone(),
        };
        let receipt = self
            .ledger
            .claim_royalty(&signer, &request)
            .await
            .map_err(transaction_failure)?;
        tracing::info!(asset_id, tx_hash = %receipt.tx_hash, "Royalty claimed");
        Ok(ClaimOutcome {
            tx_hash: receipt.tx_hash,
            claimed_amount: receipt.claimed_amount,
        })
    }

    async fn require_owner(&self, asset_id: &str, signer: &str) -> Result<(), LicensingError> {
        let owner = self
            .ledger
            .asset_owner(asset_id)
            .await
            .map_err(transaction_failure)?
            .ok_or_else(|| LicensingError::AssetNotFound(asset_id.to_string()))?;
        if !same_address(&owner, signer) {
            return Err(LicensingError::NotAssetOwner);
        }
        Ok(())
    }

    /// Record attached terms on the package. Failures only warn: the terms
    /// are on the ledger regardless.
    async fn persist_terms(&self, asset_id: &str, terms_id: &str) -> Option<String> {
        let package = match self.store.find_by_asset_id(asset_id).await {
            Ok(Some(package)) => package,
            Ok(None) => {
                tracing::warn!(asset_id, "No package found for asset, terms not recorded");
                return Some(format!("No package is linked to asset {asset_id}"));
            }
            Err(e) => {
                tracing::warn!(asset_id, error = %e, "Failed to look up package for asset");
                return Some(format!("License terms were attached but not saved: {e}"));
            }
        };
        match self.store.set_license_terms(package.id, terms_id).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(asset_id, package_id = %package.id, error = %e, "Failed to save license terms");
                Some(format!("License terms were attached but not saved: {e}"))
            }
        }
    }
}

fn connected(signer: Option<&str>) -> Result<String, LicensingError> {
    match signer {
        Some(s) if is_valid_address(s) => Ok(s.to_lowercase()),
        _ => Err(LicensingError::SignerNotConnected),
    }
}

fn required_asset(asset_id: &str) -> Result<&str, LicensingError> {
    let trimmed = asset_id.trim();
    if trimmed.is_empty() {
        return Err(LicensingError::MissingAssetId);
    }
    Ok(trimmed)
}

fn transaction_failure(err: taleforge_providers::ledger::LedgerError) -> LicensingError {
    tracing::error!(error = %err, "Ledger transaction failed");
    TransactionError::from(err).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn signer_must_be_a_valid_address() {
        assert_matches!(connected(None), Err(LicensingError::SignerNotConnected));
        assert_matches!(connected(Some("0x12")), Err(LicensingError::SignerNotConnected));
        assert_eq!(
            connected(Some("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed")).unwrap(),
            "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"
        );
    }

    #[test]
    fn blank_asset_id_is_missing() {
        assert_matches!(required_asset("  "), Err(LicensingError::MissingAssetId));
        assert_eq!(required_asset(" 0xasset ").unwrap(), "0xasset");
    }
}
