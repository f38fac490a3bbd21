use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taleforge_api::config::{ConfigError, ProviderConfig, ServerConfig};
use taleforge_api::router::build_app_router;
use taleforge_api::state::AppState;
use taleforge_core::store::{MemoryPackageStore, PackageStore};
use taleforge_db::store::PgPackageStore;
use taleforge_events::{EventBus, EventPersistence, ProgressHub};
use taleforge_pipeline::synthesis::ImageSynthesizer;
use taleforge_pipeline::{LicensingCoordinator, Orchestrator, PipelineServices, RegistrationCoordinator};
use taleforge_providers::http::{build_client, HttpError};
use taleforge_providers::image::OpenAiImageBackend;
use taleforge_providers::ledger::JsonRpcLedgerClient;
use taleforge_providers::storage::PinataClient;
use taleforge_providers::text::OpenAiTextClient;

/// Anything that stops the server from coming up.
#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid HOST address: {0}")]
    Host(#[from] AddrParseError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to run database migrations: {0}")]
    Migrations(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] HttpError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "taleforge_api=debug,taleforge_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env()?;
    let providers = ProviderConfig::from_env()?;
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let progress = Arc::new(ProgressHub::default());

    // --- Package store ---
    let mut persistence_handle = None;
    let (store, pool): (Arc<dyn PackageStore>, Option<taleforge_db::DbPool>) = match &config.database_url {
        Some(url) => {
            let pool = taleforge_db::create_pool(url).await?;
            tracing::info!("Database connection pool created");

            taleforge_db::health_check(&pool).await?;
            taleforge_db::run_migrations(&pool).await?;
            tracing::info!("Database migrations applied");

            // Spawn event persistence (writes all events to the database).
            persistence_handle = Some(tokio::spawn(EventPersistence::run(
                pool.clone(),
                event_bus.subscribe(),
            )));

            let store: Arc<dyn PackageStore> = Arc::new(PgPackageStore::new(pool.clone()));
            (store, Some(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, packages are kept in memory");
            let store: Arc<dyn PackageStore> = Arc::new(MemoryPackageStore::new());
            (store, None)
        }
    };

    // --- Providers ---
    let client = build_client(Duration::from_secs(providers.http_timeout_secs))?;
    let text = Arc::new(OpenAiTextClient::new(
        client.clone(),
        providers.text.base_url.clone(),
        providers.text.api_key.clone(),
    ));
    let images = ImageSynthesizer::new(
        Arc::new(OpenAiImageBackend::new(
            client.clone(),
            "primary",
            providers.primary_image.base_url.clone(),
            providers.text.api_key.clone(),
            providers.primary_image.model.clone(),
        )),
        Arc::new(OpenAiImageBackend::new(
            client.clone(),
            "secondary",
            providers.secondary_image.base_url.clone(),
            providers.text.api_key.clone(),
            providers.secondary_image.model.clone(),
        )),
    );
    let content = Arc::new(PinataClient::new(
        client.clone(),
        providers.content.api_url.clone(),
        providers.content.gateway_url.clone(),
        providers.content.jwt.clone(),
    ));
    let ledger = Arc::new(JsonRpcLedgerClient::new(client, providers.ledger.rpc_url.clone()));

    // --- Pipeline ---
    let orchestrator = Orchestrator::new(Arc::new(PipelineServices {
        store: Arc::clone(&store),
        text,
        images,
        content: content.clone(),
        progress: Arc::clone(&progress),
        events: Arc::clone(&event_bus),
        config: providers.pipeline_config(),
    }));
    let registration = Arc::new(RegistrationCoordinator::new(
        Arc::clone(&store),
        ledger.clone(),
        content,
        Arc::clone(&event_bus),
        providers.ledger_config(),
    ));
    let licensing = Arc::new(LicensingCoordinator::new(
        Arc::clone(&store),
        ledger,
        Arc::clone(&event_bus),
        providers.ledger_config(),
    ));

    let shutdown = CancellationToken::new();

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        pool,
        orchestrator,
        registration,
        licensing,
        progress,
        event_bus: Arc::clone(&event_bus),
        shutdown: shutdown.clone(),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(config.host.parse::<IpAddr>()?, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Drop the event bus sender to close the broadcast channel.
    // This signals persistence to shut down.
    drop(event_bus);
    if let Some(handle) = persistence_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        tracing::info!("Event persistence shut down");
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Open progress streams never finish on their own before their lifetime
/// runs out, so the token is cancelled as soon as the signal arrives.
async fn shutdown_signal(streams: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }

    streams.cancel();
}
