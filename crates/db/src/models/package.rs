//! Package rows and their conversion to the domain aggregate.
//!
//! Pipeline output (analysis, story, visuals, progress) is stored as JSONB
//! and decoded with serde on the way out.

use sqlx::FromRow;
use taleforge_core::package::{ModelChoice, Package, Record};
use taleforge_core::types::{PackageId, Timestamp};
use uuid::Uuid;

use super::status::{PackageStatus, StatusId};

/// A row from the `packages` table.
#[derive(Debug, Clone, FromRow)]
pub struct PackageRow {
    pub id: PackageId,
    pub record_id: Uuid,
    pub user_id: String,
    pub text: String,
    pub recorded_at: Timestamp,
    pub content_hash: String,
    pub creator_address: Option<String>,
    pub model_choice: String,
    pub analysis: Option<serde_json::Value>,
    pub story: Option<serde_json::Value>,
    pub visuals: serde_json::Value,
    pub status_id: StatusId,
    pub progress: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub is_public: bool,
    pub asset_id: Option<String>,
    pub owner_address: Option<String>,
    pub license_terms_id: Option<String>,
    pub tx_hash: Option<String>,
    pub registration_started_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

fn decode_err(column: &str, e: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::Decode(format!("packages.{column}: {e}").into())
}

fn decode_json<T: serde::de::DeserializeOwned>(
    column: &str,
    value: Option<serde_json::Value>,
) -> Result<Option<T>, sqlx::Error> {
    value
        .map(|v| serde_json::from_value(v).map_err(|e| decode_err(column, e)))
        .transpose()
}

/// Encode an optional domain value for a nullable JSONB column.
pub fn encode_json<T: serde::Serialize>(value: Option<&T>) -> Result<Option<serde_json::Value>, sqlx::Error> {
    value
        .map(|v| serde_json::to_value(v).map_err(|e| sqlx::Error::Encode(Box::new(e))))
        .transpose()
}

impl TryFrom<PackageRow> for Package {
    type Error = sqlx::Error;

    fn try_from(row: PackageRow) -> Result<Self, Self::Error> {
        let status = PackageStatus::from_id(row.status_id)
            .ok_or_else(|| decode_err("status_id", row.status_id))?;
        let model_choice =
            ModelChoice::from_name(&row.model_choice).map_err(|e| decode_err("model_choice", e))?;
        let visuals = serde_json::from_value(row.visuals).map_err(|e| decode_err("visuals", e))?;

        Ok(Package {
            id: row.id,
            record: Record {
                id: row.record_id,
                user_id: row.user_id,
                text: row.text,
                recorded_at: row.recorded_at,
            },
            content_hash: row.content_hash,
            creator_address: row.creator_address,
            model_choice,
            analysis: decode_json("analysis", row.analysis)?,
            story: decode_json("story", row.story)?,
            visuals,
            status: status.into(),
            progress: decode_json("progress", row.progress)?,
            error_message: row.error_message,
            is_public: row.is_public,
            asset_id: row.asset_id,
            owner_address: row.owner_address,
            license_terms_id: row.license_terms_id,
            tx_hash: row.tx_hash,
            registration_started_at: row.registration_started_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
