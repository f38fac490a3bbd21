use std::sync::Arc;
use std::time::Duration;

use taleforge_core::store::PackageStore;
use taleforge_events::{EventBus, ProgressHub};
use taleforge_pipeline::{LicensingCoordinator, Orchestrator, RegistrationCoordinator};
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind an `Arc` or is a handle.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Source of truth for packages.
    pub store: Arc<dyn PackageStore>,
    /// Postgres pool, when running against a database.
    pub pool: Option<taleforge_db::DbPool>,
    pub orchestrator: Orchestrator,
    pub registration: Arc<RegistrationCoordinator>,
    pub licensing: Arc<LicensingCoordinator>,
    /// Per-job progress topics.
    pub progress: Arc<ProgressHub>,
    /// Centralized event bus for publishing platform events.
    pub event_bus: Arc<EventBus>,
    /// Cancelled on shutdown so open progress streams end promptly.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn progress_lifetime(&self) -> Duration {
        Duration::from_secs(self.config.progress_channel_max_secs)
    }
}
