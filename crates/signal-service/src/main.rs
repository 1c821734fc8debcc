//! Signal Service
//!
//! Entry point for the chat and call-signaling server.

use signal_service::config::{Config, LogFormat};
use signal_service::observability::metrics::init_metrics_recorder;
use signal_service::routes::{self, AppState};
use signal_service::store::memory::InMemoryStore;
use signal_service::store::Stores;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first: it selects the log format
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "signal_service=debug,tower_http=debug".into());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    info!("Starting Signal Service");
    info!(
        bind_address = %config.bind_address,
        auth_timeout_secs = config.auth_timeout.as_secs(),
        ring_timeout_secs = config.ring_timeout.as_secs(),
        free_tier_daily_limit = config.free_tier_daily_limit,
        seed_users = config.seed_users.len(),
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let store = InMemoryStore::new();
    for user in config.seed_users.iter().cloned() {
        store.insert_user(user.into_identity());
    }
    let stores = Stores::from_backend(Arc::new(store));

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState::new(config, stores, shutdown.clone()));
    let health = Arc::clone(&state.health);
    let app = routes::build_routes(Arc::clone(&state), Some(metrics_handle));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    health.set_ready();
    info!("Signal Service listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            health.set_not_ready();
            // Closes every session; their writers send 1001 and exit
            shutdown.cancel();
        })
        .await?;

    info!("Signal Service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
