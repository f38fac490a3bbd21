//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for [`PlatformEvent`]s.
//! It is shared via `Arc<EventBus>` across the application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub const PACKAGE_CREATED: &str = "package.created";
pub const PACKAGE_COMPLETED: &str = "package.completed";
pub const PACKAGE_FAILED: &str = "package.failed";
pub const ASSET_REGISTERED: &str = "asset.registered";
pub const LICENSE_TERMS_ATTACHED: &str = "asset.license_terms_attached";

// ---------------------------------------------------------------------------
// PlatformEvent
// ---------------------------------------------------------------------------

/// A domain event that occurred on the platform.
///
/// Constructed via [`PlatformEvent::new`] and enriched with
/// [`with_source`](PlatformEvent::with_source),
/// [`with_actor`](PlatformEvent::with_actor) and
/// [`with_payload`](PlatformEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Dot-separated event name, e.g. `"package.completed"`.
    pub event_type: String,

    /// Source entity kind (e.g. `"package"`, `"asset"`).
    pub source_entity_type: Option<String>,

    pub source_entity_id: Option<String>,

    /// User id or wallet address that triggered the event.
    pub actor: Option<String>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl PlatformEvent {
    /// Create a new event with only the required `event_type`.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source_entity_type: None,
            source_entity_id: None,
            actor: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_source(mut self, entity_type: impl Into<String>, entity_id: impl ToString) -> Self {
        self.source_entity_type = Some(entity_type.into());
        self.source_entity_id = Some(entity_id.to_string());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use taleforge_events::bus::{EventBus, PlatformEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(PlatformEvent::new("package.created"));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity. Slow receivers
    /// observe `RecvError::Lagged` once the buffer overflows.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Dropped silently when
    /// nobody is listening.
    pub fn publish(&self, event: PlatformEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_enriched_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(
            PlatformEvent::new(PACKAGE_COMPLETED)
                .with_source("package", "p-1")
                .with_actor("user-1")
                .with_payload(serde_json::json!({ "visuals": 3 })),
        );

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.event_type, "package.completed");
        assert_eq!(e1.source_entity_id.as_deref(), Some("p-1"));
        assert_eq!(e1.actor.as_deref(), Some("user-1"));
        assert_eq!(e2.payload["visuals"], 3);
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        EventBus::default().publish(PlatformEvent::new("orphan.event"));
    }
}
