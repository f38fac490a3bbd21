//! Persisted platform events.

use serde::Serialize;
use sqlx::FromRow;
use taleforge_core::types::Timestamp;

/// A row from the `events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Event {
    pub id: i64,
    pub event_type: String,
    pub source_entity_type: Option<String>,
    pub source_entity_id: Option<String>,
    pub actor: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
}
