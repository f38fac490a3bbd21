//! Package persistence seam.
//!
//! [`PackageStore`] is the single source of truth for packages. The
//! pipeline writes only its own fields through
//! [`update_pipeline`](PackageStore::update_pipeline); registration data is
//! written through the dedicated registration operations so the two never
//! clobber each other.
//!
//! [`MemoryPackageStore`] backs tests and database-less development runs.
//! The Postgres implementation lives in `taleforge-db`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use tokio::sync::RwLock;

use crate::package::Package;
use crate::registration::{RegistrationRecord, REGISTRATION_LEASE};
use crate::types::{PackageId, Timestamp};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Content already submitted as package {existing}")]
    DuplicateContent { existing: PackageId },

    #[error("Package {0} not found")]
    NotFound(PackageId),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait PackageStore: Send + Sync {
    /// Insert a new package. Fails with [`StoreError::DuplicateContent`] if
    /// an unreleased package already holds the same content hash.
    async fn insert(&self, package: &Package) -> Result<(), StoreError>;

    async fn get(&self, id: PackageId) -> Result<Option<Package>, StoreError>;

    /// Look up the package currently holding `content_hash`.
    async fn find_by_content_hash(&self, content_hash: &str)
        -> Result<Option<Package>, StoreError>;

    async fn find_by_asset_id(&self, asset_id: &str) -> Result<Option<Package>, StoreError>;

    /// Stop `id` from participating in duplicate detection.
    async fn release_content_hash(&self, id: PackageId) -> Result<(), StoreError>;

    /// Persist pipeline-owned fields (analysis, story, visuals, status,
    /// progress, error). Rejects status regressions.
    async fn update_pipeline(&self, package: &Package) -> Result<(), StoreError>;

    async fn set_visibility(&self, id: PackageId, is_public: bool) -> Result<(), StoreError>;

    /// Take the registration lease. Returns `false` if another attempt holds
    /// an unexpired lease or the package is already registered.
    async fn try_begin_registration(&self, id: PackageId, now: Timestamp)
        -> Result<bool, StoreError>;

    /// Record the confirmed registration and release the lease. The asset id
    /// can only be set once.
    async fn finish_registration(
        &self,
        id: PackageId,
        record: &RegistrationRecord,
    ) -> Result<(), StoreError>;

    /// Release the lease without registering.
    async fn abort_registration(&self, id: PackageId) -> Result<(), StoreError>;

    async fn set_license_terms(&self, id: PackageId, terms_id: &str) -> Result<(), StoreError>;
}

/// Whether a lease taken at `started_at` has lapsed by `now`.
pub fn lease_expired(started_at: Timestamp, now: Timestamp) -> bool {
    let lease = ChronoDuration::from_std(REGISTRATION_LEASE).unwrap_or(ChronoDuration::minutes(10));
    now - started_at >= lease
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    packages: HashMap<PackageId, Package>,
    released: HashSet<PackageId>,
}

/// Process-local [`PackageStore`].
#[derive(Default)]
pub struct MemoryPackageStore {
    state: RwLock<MemoryState>,
}

impl MemoryPackageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryState {
    fn holder_of(&self, content_hash: &str) -> Option<&Package> {
        self.packages
            .values()
            .find(|p| p.content_hash == content_hash && !self.released.contains(&p.id))
    }

    fn get_mut(&mut self, id: PackageId) -> Result<&mut Package, StoreError> {
        self.packages.get_mut(&id).ok_or(StoreError::NotFound(id))
    }
}

#[async_trait]
impl PackageStore for MemoryPackageStore {
    async fn insert(&self, package: &Package) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.holder_of(&package.content_hash) {
            return Err(StoreError::DuplicateContent {
                existing: existing.id,
            });
        }
        if state.packages.contains_key(&package.id) {
            return Err(StoreError::Conflict(format!(
                "Package {} already exists",
                package.id
            )));
        }
        state.packages.insert(package.id, package.clone());
        Ok(())
    }

    async fn get(&self, id: PackageId) -> Result<Option<Package>, StoreError> {
        Ok(self.state.read().await.packages.get(&id).cloned())
    }

    async fn find_by_content_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<Package>, StoreError> {
        Ok(self.state.read().await.holder_of(content_hash).cloned())
    }

    async fn find_by_asset_id(&self, asset_id: &str) -> Result<Option<Package>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .packages
            .values()
            .find(|p| p.asset_id.as_deref() == Some(asset_id))
            .cloned())
    }

    async fn release_content_hash(&self, id: PackageId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.get_mut(id)?;
        state.released.insert(id);
        Ok(())
    }

    async fn update_pipeline(&self, package: &Package) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let stored = state.get_mut(package.id)?;
        if stored.status != package.status && !stored.status.can_transition_to(package.status) {
            return Err(StoreError::Conflict(format!(
                "Package {} cannot move from {} to {}",
                package.id, stored.status, package.status
            )));
        }
        stored.analysis = package.analysis.clone();
        stored.story = package.story.clone();
        stored.visuals = package.visuals.clone();
        stored.status = package.status;
        stored.progress = package.progress.clone();
        stored.error_message = package.error_message.clone();
        stored.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn set_visibility(&self, id: PackageId, is_public: bool) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let stored = state.get_mut(id)?;
        stored.is_public = is_public;
        stored.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn try_begin_registration(
        &self,
        id: PackageId,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let stored = state.get_mut(id)?;
        if stored.asset_id.is_some() {
            return Ok(false);
        }
        match stored.registration_started_at {
            Some(started) if !lease_expired(started, now) => Ok(false),
            _ => {
                stored.registration_started_at = Some(now);
                Ok(true)
            }
        }
    }

    async fn finish_registration(
        &self,
        id: PackageId,
        record: &RegistrationRecord,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let stored = state.get_mut(id)?;
        if stored.asset_id.is_some() {
            return Err(StoreError::Conflict(format!(
                "Package {id} already has an asset id"
            )));
        }
        stored.asset_id = Some(record.asset_id.clone());
        stored.owner_address = Some(record.owner_address.clone());
        stored.tx_hash = Some(record.tx_hash.clone());
        stored.license_terms_id = record.license_terms_id.clone();
        stored.registration_started_at = None;
        stored.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn abort_registration(&self, id: PackageId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.get_mut(id)?.registration_started_at = None;
        Ok(())
    }

    async fn set_license_terms(&self, id: PackageId, terms_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let stored = state.get_mut(id)?;
        stored.license_terms_id = Some(terms_id.to_string());
        stored.updated_at = chrono::Utc::now();
        Ok(())
    }
}
