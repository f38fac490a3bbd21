//! Repository for the `events` table.

use sqlx::PgPool;

use crate::models::event::Event;

/// Column list for `events` queries.
const COLUMNS: &str =
    "id, event_type, source_entity_type, source_entity_id, actor, payload, created_at";

/// Provides read/write operations for persisted platform events.
pub struct EventRepo;

impl EventRepo {
    /// Insert a new event row, returning the generated ID.
    pub async fn insert(
        pool: &PgPool,
        event_type: &str,
        source_entity_type: Option<&str>,
        source_entity_id: Option<&str>,
        actor: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO events \
                (event_type, source_entity_type, source_entity_id, actor, payload) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id",
        )
        .bind(event_type)
        .bind(source_entity_type)
        .bind(source_entity_id)
        .bind(actor)
        .bind(payload)
        .fetch_one(pool)
        .await
    }

    /// Events recorded for one entity, oldest first.
    pub async fn list_for_entity(
        pool: &PgPool,
        source_entity_type: &str,
        source_entity_id: &str,
    ) -> Result<Vec<Event>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM events \
             WHERE source_entity_type = $1 AND source_entity_id = $2 \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(source_entity_type)
            .bind(source_entity_id)
            .fetch_all(pool)
            .await
    }
}
