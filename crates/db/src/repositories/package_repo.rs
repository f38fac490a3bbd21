//! Repository for the `packages` table.
//!
//! Pipeline writes and registration writes touch disjoint column sets.
//! Status moves are guarded in SQL so a stale writer cannot regress a
//! terminal package.

use sqlx::PgPool;
use taleforge_core::package::{Package, PackageStatus as DomainPackageStatus};
use taleforge_core::registration::RegistrationRecord;
use taleforge_core::types::{PackageId, Timestamp};

use crate::models::package::{encode_json, PackageRow};
use crate::models::status::{PackageStatus, StatusId};

/// Column list for `packages` queries.
const COLUMNS: &str = "\
    id, record_id, user_id, text, recorded_at, content_hash, creator_address, \
    model_choice, analysis, story, visuals, status_id, progress, error_message, \
    is_public, asset_id, owner_address, license_terms_id, tx_hash, \
    registration_started_at, created_at, updated_at";

/// Unique index enforcing one live package per content hash.
pub const UQ_CONTENT_HASH: &str = "uq_packages_content_hash";

/// Unique index enforcing one package per ledger asset.
pub const UQ_ASSET_ID: &str = "uq_packages_asset_id";

/// Status IDs a package may hold before being written with `next`.
fn allowed_prior_statuses(next: DomainPackageStatus) -> Vec<StatusId> {
    DomainPackageStatus::ALL
        .into_iter()
        .filter(|s| *s == next || s.can_transition_to(next))
        .map(|s| PackageStatus::from(s).id())
        .collect()
}

/// Provides persistence operations for creative packages.
pub struct PackageRepo;

impl PackageRepo {
    pub async fn insert(pool: &PgPool, package: &Package) -> Result<(), sqlx::Error> {
        let visuals = serde_json::to_value(&package.visuals)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query(
            "INSERT INTO packages \
                (id, record_id, user_id, text, recorded_at, content_hash, creator_address, \
                 model_choice, analysis, story, visuals, status_id, progress, error_message, \
                 is_public, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(package.id)
        .bind(package.record.id)
        .bind(&package.record.user_id)
        .bind(&package.record.text)
        .bind(package.record.recorded_at)
        .bind(&package.content_hash)
        .bind(&package.creator_address)
        .bind(package.model_choice.name())
        .bind(encode_json(package.analysis.as_ref())?)
        .bind(encode_json(package.story.as_ref())?)
        .bind(visuals)
        .bind(PackageStatus::from(package.status).id())
        .bind(encode_json(package.progress.as_ref())?)
        .bind(&package.error_message)
        .bind(package.is_public)
        .bind(package.created_at)
        .bind(package.updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(pool: &PgPool, id: PackageId) -> Result<Option<Package>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM packages WHERE id = $1");
        sqlx::query_as::<_, PackageRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(Package::try_from)
            .transpose()
    }

    /// The package currently holding `content_hash` for duplicate detection.
    pub async fn find_by_content_hash(
        pool: &PgPool,
        content_hash: &str,
    ) -> Result<Option<Package>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM packages \
             WHERE content_hash = $1 AND NOT content_hash_released"
        );
        sqlx::query_as::<_, PackageRow>(&query)
            .bind(content_hash)
            .fetch_optional(pool)
            .await?
            .map(Package::try_from)
            .transpose()
    }

    pub async fn find_by_asset_id(
        pool: &PgPool,
        asset_id: &str,
    ) -> Result<Option<Package>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM packages WHERE asset_id = $1");
        sqlx::query_as::<_, PackageRow>(&query)
            .bind(asset_id)
            .fetch_optional(pool)
            .await?
            .map(Package::try_from)
            .transpose()
    }

    pub async fn exists(pool: &PgPool, id: PackageId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM packages WHERE id = $1)")
            .bind(id)
            .fetch_one(pool)
            .await
    }

    /// Take a package out of duplicate detection. Returns `false` if no row
    /// matched.
    pub async fn release_content_hash(pool: &PgPool, id: PackageId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE packages SET content_hash_released = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Write pipeline-owned columns. Returns `false` if the row is missing
    /// or its current status cannot move to `package.status`.
    pub async fn update_pipeline(pool: &PgPool, package: &Package) -> Result<bool, sqlx::Error> {
        let visuals = serde_json::to_value(&package.visuals)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let result = sqlx::query(
            "UPDATE packages \
             SET analysis = $2, story = $3, visuals = $4, status_id = $5, \
                 progress = $6, error_message = $7, updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($8)",
        )
        .bind(package.id)
        .bind(encode_json(package.analysis.as_ref())?)
        .bind(encode_json(package.story.as_ref())?)
        .bind(visuals)
        .bind(PackageStatus::from(package.status).id())
        .bind(encode_json(package.progress.as_ref())?)
        .bind(&package.error_message)
        .bind(allowed_prior_statuses(package.status))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn set_visibility(
        pool: &PgPool,
        id: PackageId,
        is_public: bool,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE packages SET is_public = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(is_public)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Compare-and-swap on `registration_started_at`. Succeeds only when the
    /// package is unregistered and the lease is free or older than
    /// `stale_before`.
    pub async fn try_begin_registration(
        pool: &PgPool,
        id: PackageId,
        now: Timestamp,
        stale_before: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE packages SET registration_started_at = $2 \
             WHERE id = $1 AND asset_id IS NULL \
               AND (registration_started_at IS NULL OR registration_started_at <= $3)",
        )
        .bind(id)
        .bind(now)
        .bind(stale_before)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Record a confirmed registration and clear the lease. Returns `false`
    /// if the row is missing or already carries an asset id.
    pub async fn finish_registration(
        pool: &PgPool,
        id: PackageId,
        record: &RegistrationRecord,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE packages \
             SET asset_id = $2, owner_address = $3, tx_hash = $4, license_terms_id = $5, \
                 registration_started_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND asset_id IS NULL",
        )
        .bind(id)
        .bind(&record.asset_id)
        .bind(&record.owner_address)
        .bind(&record.tx_hash)
        .bind(&record.license_terms_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn abort_registration(pool: &PgPool, id: PackageId) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE packages SET registration_started_at = NULL WHERE id = $1")
                .bind(id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn set_license_terms(
        pool: &PgPool,
        id: PackageId,
        terms_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE packages SET license_terms_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(terms_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_writes_only_from_processing_or_same_status() {
        let ids = allowed_prior_statuses(DomainPackageStatus::Completed);
        assert_eq!(
            ids,
            vec![PackageStatus::Processing.id(), PackageStatus::Completed.id()]
        );
    }

    #[test]
    fn processing_cannot_be_written_over_a_terminal_row() {
        let ids = allowed_prior_statuses(DomainPackageStatus::Processing);
        assert!(!ids.contains(&PackageStatus::Completed.id()));
        assert!(!ids.contains(&PackageStatus::Failed.id()));
    }
}
