//! Liveness and readiness endpoints.
//!
//! - `GET /health` - the process is running
//! - `GET /ready` - accepting sessions: the listener is bound and the root
//!   shutdown token has not been cancelled. The body reports the live
//!   session count.
//!
//! `/metrics` is mounted next to these by [`crate::routes::build_routes`].

use crate::actors::ChannelRegistry;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Readiness derived from the server lifecycle and the session registry.
#[derive(Debug)]
pub struct HealthState {
    bound: AtomicBool,
    shutdown: CancellationToken,
    registry: Arc<ChannelRegistry>,
}

#[derive(Debug, Serialize)]
struct Readiness {
    status: &'static str,
    sessions: usize,
}

impl HealthState {
    /// Not ready until [`HealthState::set_ready`] is called.
    #[must_use]
    pub fn new(shutdown: CancellationToken, registry: Arc<ChannelRegistry>) -> Self {
        Self {
            bound: AtomicBool::new(false),
            shutdown,
            registry,
        }
    }

    /// Called once the listener is bound.
    pub fn set_ready(&self) {
        self.bound.store(true, Ordering::SeqCst);
    }

    /// Called when shutdown begins, ahead of cancelling the root token.
    pub fn set_not_ready(&self) {
        self.bound.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.bound.load(Ordering::SeqCst) && !self.shutdown.is_cancelled()
    }

    fn readiness(&self) -> Readiness {
        Readiness {
            status: if self.is_ready() { "ready" } else { "not_ready" },
            sessions: self.registry.session_count(),
        }
    }
}

/// Router serving `/health` and `/ready`.
pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

async fn readiness_handler(
    State(state): State<Arc<HealthState>>,
) -> (StatusCode, Json<Readiness>) {
    let body = state.readiness();
    let status = if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}
