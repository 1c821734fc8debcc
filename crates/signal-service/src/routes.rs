//! HTTP routes for the signal service.
//!
//! Defines the Axum router and application state.

use crate::actors::ChannelRegistry;
use crate::auth::{IdentityResolver, JwtVerifier, TokenVerifier};
use crate::config::Config;
use crate::observability::{health_router, HealthState};
use crate::signaling::SignalRouter;
use crate::store::Stores;
use crate::transport;
use axum::{extract::State, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Application state shared across all handlers.
pub struct AppState {
    pub config: Arc<Config>,

    /// Channel registry shared by every session.
    pub registry: Arc<ChannelRegistry>,

    pub router: Arc<SignalRouter>,

    /// Resolves handshake credentials to principals.
    pub resolver: Arc<IdentityResolver>,

    pub health: Arc<HealthState>,

    /// Root token; every session token is a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the service together over `stores`, verifying HS256 tokens with
    /// the configured secret.
    pub fn new(config: Config, stores: Stores, shutdown: CancellationToken) -> Self {
        let verifier: Arc<dyn TokenVerifier> =
            Arc::new(JwtVerifier::new(&config.jwt_secret, config.jwt_clock_skew));
        Self::with_verifier(config, stores, verifier, shutdown)
    }

    /// Wire the service together with an explicit token verifier.
    pub fn with_verifier(
        config: Config,
        stores: Stores,
        verifier: Arc<dyn TokenVerifier>,
        shutdown: CancellationToken,
    ) -> Self {
        let registry = Arc::new(ChannelRegistry::new());
        let resolver = Arc::new(IdentityResolver::new(
            verifier,
            Arc::clone(&stores.users),
            config.auth_timeout,
        ));
        let router = Arc::new(SignalRouter::new(
            Arc::clone(&registry),
            stores,
            config.router_settings(),
            shutdown.clone(),
        ));

        let health = Arc::new(HealthState::new(shutdown.clone(), Arc::clone(&registry)));

        Self {
            config: Arc::new(config),
            registry,
            router,
            resolver,
            health,
            shutdown,
        }
    }
}

/// Build the application routes.
///
/// - `/ws/chat/:room` - chat websocket
/// - `/ws/call` - call-signaling websocket
/// - `/health`, `/ready` - liveness and readiness probes
/// - `/metrics` - Prometheus scrape endpoint, when a recorder is installed
/// - TraceLayer for request logging
pub fn build_routes(state: Arc<AppState>, metrics_handle: Option<PrometheusHandle>) -> Router {
    let ws_routes = Router::new()
        .route("/ws/chat/:room", get(transport::ws::chat_handler))
        .route("/ws/call", get(transport::ws::call_handler))
        .with_state(Arc::clone(&state));

    let mut app = Router::new()
        .merge(ws_routes)
        .merge(health_router(Arc::clone(&state.health)));

    if let Some(handle) = metrics_handle {
        let metrics_routes = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(handle);
        app = app.merge(metrics_routes);
    }

    app.layer(TraceLayer::new_for_http())
}

async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
