//! [`PackageStore`] backed by Postgres.

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use taleforge_core::package::Package;
use taleforge_core::registration::{RegistrationRecord, REGISTRATION_LEASE};
use taleforge_core::store::{PackageStore, StoreError};
use taleforge_core::types::{PackageId, Timestamp};

use crate::repositories::package_repo::{PackageRepo, UQ_ASSET_ID, UQ_CONTENT_HASH};
use crate::DbPool;

pub struct PgPackageStore {
    pool: DbPool,
}

impl PgPackageStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Name of the unique constraint a 23505 error tripped, if that is what
/// `err` is.
fn violated_unique_constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            db_err.constraint()
        }
        _ => None,
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    tracing::error!(error = %err, "Package store query failed");
    StoreError::Backend(err.to_string())
}

impl PgPackageStore {
    /// Distinguish "no such row" from "guard rejected the write" after an
    /// UPDATE touched zero rows.
    async fn missing_or_conflict(&self, id: PackageId, conflict: String) -> StoreError {
        match PackageRepo::exists(&self.pool, id).await {
            Ok(true) => StoreError::Conflict(conflict),
            Ok(false) => StoreError::NotFound(id),
            Err(e) => backend(e),
        }
    }

    fn require(id: PackageId, updated: Result<bool, sqlx::Error>) -> Result<(), StoreError> {
        match updated {
            Ok(true) => Ok(()),
            Ok(false) => Err(StoreError::NotFound(id)),
            Err(e) => Err(backend(e)),
        }
    }
}

#[async_trait]
impl PackageStore for PgPackageStore {
    async fn insert(&self, package: &Package) -> Result<(), StoreError> {
        match PackageRepo::insert(&self.pool, package).await {
            Ok(()) => Ok(()),
            Err(e) if violated_unique_constraint(&e) == Some(UQ_CONTENT_HASH) => {
                let holder = PackageRepo::find_by_content_hash(&self.pool, &package.content_hash)
                    .await
                    .map_err(backend)?;
                match holder {
                    Some(existing) => Err(StoreError::DuplicateContent {
                        existing: existing.id,
                    }),
                    None => Err(StoreError::Conflict(
                        "Content hash collided with a package that no longer holds it".to_string(),
                    )),
                }
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn get(&self, id: PackageId) -> Result<Option<Package>, StoreError> {
        PackageRepo::find_by_id(&self.pool, id).await.map_err(backend)
    }

    async fn find_by_content_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<Package>, StoreError> {
        PackageRepo::find_by_content_hash(&self.pool, content_hash)
            .await
            .map_err(backend)
    }

    async fn find_by_asset_id(&self, asset_id: &str) -> Result<Option<Package>, StoreError> {
        PackageRepo::find_by_asset_id(&self.pool, asset_id)
            .await
            .map_err(backend)
    }

    async fn release_content_hash(&self, id: PackageId) -> Result<(), StoreError> {
        Self::require(id, PackageRepo::release_content_hash(&self.pool, id).await)
    }

    async fn update_pipeline(&self, package: &Package) -> Result<(), StoreError> {
        match PackageRepo::update_pipeline(&self.pool, package).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(self
                .missing_or_conflict(
                    package.id,
                    format!("Package {} cannot move to {}", package.id, package.status),
                )
                .await),
            Err(e) => Err(backend(e)),
        }
    }

    async fn set_visibility(&self, id: PackageId, is_public: bool) -> Result<(), StoreError> {
        Self::require(id, PackageRepo::set_visibility(&self.pool, id, is_public).await)
    }

    async fn try_begin_registration(
        &self,
        id: PackageId,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let lease = ChronoDuration::from_std(REGISTRATION_LEASE)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let taken = PackageRepo::try_begin_registration(&self.pool, id, now, now - lease)
            .await
            .map_err(backend)?;
        if !taken && !PackageRepo::exists(&self.pool, id).await.map_err(backend)? {
            return Err(StoreError::NotFound(id));
        }
        Ok(taken)
    }

    async fn finish_registration(
        &self,
        id: PackageId,
        record: &RegistrationRecord,
    ) -> Result<(), StoreError> {
        match PackageRepo::finish_registration(&self.pool, id, record).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(self
                .missing_or_conflict(id, format!("Package {id} already has an asset id"))
                .await),
            Err(e) if violated_unique_constraint(&e) == Some(UQ_ASSET_ID) => Err(
                StoreError::Conflict(format!("Asset {} is already linked", record.asset_id)),
            ),
            Err(e) => Err(backend(e)),
        }
    }

    async fn abort_registration(&self, id: PackageId) -> Result<(), StoreError> {
        Self::require(id, PackageRepo::abort_registration(&self.pool, id).await)
    }

    async fn set_license_terms(&self, id: PackageId, terms_id: &str) -> Result<(), StoreError> {
        Self::require(id, PackageRepo::set_license_terms(&self.pool, id, terms_id).await)
    }
}
