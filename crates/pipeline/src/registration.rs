//! Registering a completed package as a ledger asset.
//!
//! ```text
//! Unregistered -> NetworkVerifying -> MetadataPublishing
//!              -> AwaitingSignature -> Submitted -> Registered(asset_id)
//! ```
//!
//! Preconditions are checked before anything touches the network, in a
//! fixed order so callers always get the most fundamental problem first.
//! A store lease keeps two attempts for the same package from both
//! submitting. Once the ledger confirms, the result stands even if it
//! cannot be persisted: the lease is kept and the confirmed record is held
//! in memory, so a retry returns it instead of minting again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join;
use taleforge_core::address::{is_valid_address, same_address};
use taleforge_core::hashing::to_bytes32;
use taleforge_core::license::{LicenseConfig, LicenseTerms};
use taleforge_core::package::{Package, PackageStatus};
use taleforge_core::registration::{RegistrationRecord, RegistrationState};
use taleforge_core::store::{PackageStore, StoreError};
use taleforge_core::types::PackageId;
use taleforge_events::bus::ASSET_REGISTERED;
use taleforge_events::{EventBus, PlatformEvent};
use taleforge_providers::ledger::{LedgerClient, LedgerError, MintAndRegisterRequest};
use taleforge_providers::storage::ContentStore;

use crate::config::LedgerConfig;
use crate::error::TransactionError;
use crate::metadata::{display_metadata, document_hash, domain_metadata};

/// Attempts at saving a confirmed registration before giving up.
const SAVE_ATTEMPTS: u32 = 3;
const SAVE_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("Connect a wallet before registering")]
    SignerNotConnected,

    #[error("Package {0} not found")]
    PackageNotFound(PackageId),

    #[error("Only completed packages can be registered (package is {status})")]
    PackageNotCompleted { status: PackageStatus },

    #[error("This package has no recorded creator address and cannot be registered")]
    MissingCreator,

    #[error("Only the creator's wallet can register this package")]
    CreatorMismatch,

    #[error("Package is already registered as asset {asset_id} by another owner")]
    AlreadyRegisteredByAnother { asset_id: String },

    #[error("failed to switch network")]
    NetworkSwitchFailed,

    #[error("A registration for this package is already in progress")]
    RegistrationInProgress,

    #[error("Invalid license: {0}")]
    InvalidLicense(String),

    #[error("Failed to publish asset metadata: {0}")]
    MetadataPublishFailed(String),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub package_id: PackageId,
    pub signer: Option<String>,
    pub license: LicenseConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RegistrationOutcome {
    pub asset_id: String,
    pub tx_hash: Option<String>,
    pub license_terms_id: Option<String>,
    /// The package was already registered to this signer; nothing was sent.
    pub already_registered: bool,
    /// Set when the ledger confirmed but the result could not be saved.
    pub warning: Option<String>,
}

impl RegistrationOutcome {
    fn existing(asset_id: String, package: &Package) -> Self {
        Self {
            asset_id,
            tx_hash: package.tx_hash.clone(),
            license_terms_id: package.license_terms_id.clone(),
            already_registered: true,
            warning: None,
        }
    }
}

/// Outcome of the pre-network checks.
#[derive(Debug)]
enum Precheck {
    Proceed,
    AlreadyOwned(String),
}

pub struct RegistrationCoordinator {
    store: Arc<dyn PackageStore>,
    ledger: Arc<dyn LedgerClient>,
    content: Arc<dyn ContentStore>,
    events: Arc<EventBus>,
    config: LedgerConfig,
    /// Confirmed on the ledger, not yet in the store.
    unsaved: Mutex<HashMap<PackageId, RegistrationRecord>>,
}

impl RegistrationCoordinator {
    pub fn new(
        store: Arc<dyn PackageStore>,
        ledger: Arc<dyn LedgerClient>,
        content: Arc<dyn ContentStore>,
        events: Arc<EventBus>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            content,
            events,
            config,
            unsaved: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register(
        &self,
        request: RegisterRequest,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let signer = match request.signer.as_deref() {
            Some(s) if is_valid_address(s) => s.to_lowercase(),
            _ => return Err(RegistrationError::SignerNotConnected),
        };
        let package_id = request.package_id;

        if let Some(outcome) = self.resume_unsaved(package_id, &signer).await? {
            return Ok(outcome);
        }

        let package = self.load(package_id).await?;
        if let Precheck::AlreadyOwned(asset_id) = check_preconditions(&package, &signer)? {
            tracing::info!(package_id = %package_id, asset_id = %asset_id, "Package already registered to signer");
            return Ok(RegistrationOutcome::existing(asset_id, &package));
        }

        let flavor = request
            .license
            .resolve()
            .map_err(|e| RegistrationError::InvalidLicense(e.to_string()))?;
        let terms = LicenseTerms {
            flavor,
            currency: self.config.currency_token.clone(),
        };

        let mut state = RegistrationState::Unregistered;
        advance(&mut state, RegistrationState::NetworkVerifying, package_id);
        self.ensure_network(&signer).await?;

        if !self
            .store
            .try_begin_registration(package_id, chrono::Utc::now())
            .await?
        {
            // Either another attempt holds the lease or it already finished.
            let current = self.load(package_id).await?;
            if let Precheck::AlreadyOwned(asset_id) = check_preconditions(&current, &signer)? {
                return Ok(RegistrationOutcome::existing(asset_id, &current));
            }
            return Err(RegistrationError::RegistrationInProgress);
        }

        let result = self.submit(&mut state, package, &signer, terms).await;
        // A confirmed registration clears the lease itself, or keeps it
        // while the record is unsaved.
        let lease_held = match &result {
            Ok(outcome) => outcome.already_registered,
            Err(_) => true,
        };
        if lease_held {
            if let Err(e) = self.store.abort_registration(package_id).await {
                tracing::warn!(package_id = %package_id, error = %e, "Failed to release registration lease");
            }
        }
        result
    }

    /// Everything after the lease is taken.
    async fn submit(
        &self,
        state: &mut RegistrationState,
        package: Package,
        signer: &str,
        terms: LicenseTerms,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let package_id = package.id;

        advance(state, RegistrationState::MetadataPublishing, package_id);
        let domain = domain_metadata(&package);
        let display = display_metadata(&package);
        let (domain_stored, display_stored) = join(
            self.content
                .publish_json(&domain, &format!("{package_id}-ip-metadata.json")),
            self.content
                .publish_json(&display, &format!("{package_id}-nft-metadata.json")),
        )
        .await;
        let domain_stored =
            domain_stored.map_err(|e| RegistrationError::MetadataPublishFailed(e.to_string()))?;
        let display_stored =
            display_stored.map_err(|e| RegistrationError::MetadataPublishFailed(e.to_string()))?;

        // The record may have changed while metadata was publishing.
        let current = self.load(package_id).await?;
        if let Precheck::AlreadyOwned(asset_id) = check_preconditions(&current, signer)? {
            return Ok(RegistrationOutcome::existing(asset_id, &current));
        }

        advance(state, RegistrationState::AwaitingSignature, package_id);
        let mint = MintAndRegisterRequest {
            spg_contract: self.config.spg_contract.clone(),
            recipient: signer.to_string(),
            ip_metadata_uri: domain_stored.url,
            ip_metadata_hash: document_hash(&domain),
            nft_metadata_uri: display_stored.url,
            nft_metadata_hash: document_hash(&display),
            media_hash: to_bytes32(&current.content_hash),
            terms,
        };
        let receipt = self
            .ledger
            .mint_and_register(signer, &mint)
            .await
            .map_err(|e| {
                tracing::error!(package_id = %package_id, error = %e, "Registration transaction failed");
                TransactionError::from(e)
            })?;
        advance(state, RegistrationState::Submitted, package_id);

        let record = RegistrationRecord {
            asset_id: receipt.asset_id.clone(),
            owner_address: signer.to_string(),
            tx_hash: receipt.tx_hash.clone(),
            license_terms_id: receipt.license_terms_id.clone(),
        };
        let warning = match self.save_registration(package_id, &record).await {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(
                    package_id = %package_id,
                    asset_id = %receipt.asset_id,
                    error = %e,
                    "Registered on the ledger but failed to save the result"
                );
                lock(&self.unsaved).insert(package_id, record);
                Some(unsaved_warning(&receipt.asset_id, &e))
            }
        };
        advance(
            state,
            RegistrationState::Registered {
                asset_id: receipt.asset_id.clone(),
            },
            package_id,
        );

        self.events.publish(
            PlatformEvent::new(ASSET_REGISTERED)
                .with_source("package", package_id)
                .with_actor(signer)
                .with_payload(serde_json::json!({
                    "asset_id": receipt.asset_id,
                    "tx_hash": receipt.tx_hash,
                })),
        );

        Ok(RegistrationOutcome {
            asset_id: receipt.asset_id,
            tx_hash: Some(receipt.tx_hash),
            license_terms_id: receipt.license_terms_id,
            already_registered: false,
            warning,
        })
    }

    /// Answer a retry for a package the ledger already confirmed but the
    /// store never recorded. Nothing is submitted again.
    async fn resume_unsaved(
        &self,
        package_id: PackageId,
        signer: &str,
    ) -> Result<Option<RegistrationOutcome>, RegistrationError> {
        let Some(record) = lock(&self.unsaved).get(&package_id).cloned() else {
            return Ok(None);
        };
        if !same_address(&record.owner_address, signer) {
            return Err(RegistrationError::AlreadyRegisteredByAnother {
                asset_id: record.asset_id,
            });
        }

        let warning = match self.save_registration(package_id, &record).await {
            Ok(()) => {
                lock(&self.unsaved).remove(&package_id);
                tracing::info!(package_id = %package_id, asset_id = %record.asset_id, "Saved pending registration");
                None
            }
            Err(e) => Some(unsaved_warning(&record.asset_id, &e)),
        };
        Ok(Some(RegistrationOutcome {
            asset_id: record.asset_id,
            tx_hash: Some(record.tx_hash),
            license_terms_id: record.license_terms_id,
            already_registered: true,
            warning,
        }))
    }

    /// `finish_registration` with a bounded retry. A conflict whose stored
    /// asset matches `record` means an earlier attempt landed after all.
    async fn save_registration(
        &self,
        package_id: PackageId,
        record: &RegistrationRecord,
    ) -> Result<(), StoreError> {
        let mut attempt = 1;
        loop {
            let err = match self.store.finish_registration(package_id, record).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            if let StoreError::Conflict(_) = err {
                let stored = self.store.get(package_id).await?;
                if stored.and_then(|p| p.asset_id).as_deref() == Some(record.asset_id.as_str()) {
                    return Ok(());
                }
                return Err(err);
            }
            if attempt >= SAVE_ATTEMPTS {
                return Err(err);
            }
            tracing::warn!(package_id = %package_id, attempt, error = %err, "Retrying registration save");
            tokio::time::sleep(SAVE_BACKOFF * attempt).await;
            attempt += 1;
        }
    }

    /// Make sure the signer is on the configured chain, switching (and
    /// adding the chain if the wallet has never seen it) when it is not.
    async fn ensure_network(&self, signer: &str) -> Result<(), RegistrationError> {
        let target = self.config.chain.chain_id;
        // A failed read says nothing about switching; surface the fault.
        let current = self.ledger.chain_id(signer).await.map_err(|e| {
            tracing::warn!(error = %e, "Could not read the signer's chain");
            TransactionError::from(e)
        })?;
        if current == target {
            return Ok(());
        }
        tracing::info!(current, target, "Signer is on the wrong chain, requesting a switch");

        match self.ledger.switch_chain(signer, target).await {
            Ok(()) => {}
            Err(LedgerError::UnknownChain(_)) => {
                self.ledger
                    .add_chain(signer, &self.config.chain)
                    .await
                    .map_err(network_failure)?;
                self.ledger
                    .switch_chain(signer, target)
                    .await
                    .map_err(network_failure)?;
            }
            Err(e) => return Err(network_failure(e)),
        }

        let after = self.ledger.chain_id(signer).await.map_err(network_failure)?;
        if after != target {
            tracing::warn!(after, target, "Signer is still on the wrong chain after switching");
            return Err(RegistrationError::NetworkSwitchFailed);
        }
        Ok(())
    }

    async fn load(&self, id: PackageId) -> Result<Package, RegistrationError> {
        self.store
            .get(id)
            .await?
            .ok_or(RegistrationError::PackageNotFound(id))
    }
}

fn unsaved_warning(asset_id: &str, err: &StoreError) -> String {
    format!("Asset {asset_id} was registered but could not be saved: {err}")
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn network_failure(err: LedgerError) -> RegistrationError {
    tracing::warn!(error = %err, "Network check failed");
    RegistrationError::NetworkSwitchFailed
}

fn advance(state: &mut RegistrationState, next: RegistrationState, package_id: PackageId) {
    debug_assert!(state.can_advance_to(&next), "{state} -> {next}");
    tracing::info!(package_id = %package_id, from = %state, to = %next, "Registration state change");
    *state = next;
}

/// Checks (b) through (d): completed, created by the signer, not already
/// registered elsewhere.
fn check_preconditions(package: &Package, signer: &str) -> Result<Precheck, RegistrationError> {
    if package.status != PackageStatus::Completed {
        return Err(RegistrationError::PackageNotCompleted {
            status: package.status,
        });
    }
    let creator = package
        .creator_address
        .as_deref()
        .ok_or(RegistrationError::MissingCreator)?;
    if !same_address(creator, signer) {
        return Err(RegistrationError::CreatorMismatch);
    }
    if let Some(asset_id) = &package.asset_id {
        let owner = package.owner_address.as_deref().unwrap_or(creator);
        if same_address(owner, signer) {
            return Ok(Precheck::AlreadyOwned(asset_id.clone()));
        }
        return Err(RegistrationError::AlreadyRegisteredByAnother {
            asset_id: asset_id.clone(),
        });
    }
    Ok(Precheck::Proceed)
}
