//! Health and metrics endpoint integration tests.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use metrics_exporter_prometheus::PrometheusHandle;
use signal_service::config::Config;
use signal_service::observability::metrics;
use signal_service::routes::{build_routes, AppState};
use signal_service::store::memory::InMemoryStore;
use signal_service::store::Stores;
use signal_test_utils::{TestSignalServer, TEST_JWT_SECRET};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Global metrics handle; the recorder can only be installed once per process.
static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            metrics::init_metrics_recorder().unwrap_or_else(|_| {
                metrics_exporter_prometheus::PrometheusBuilder::new()
                    .build_recorder()
                    .handle()
            })
        })
        .clone()
}

#[tokio::test]
async fn test_health_and_ready_return_200() -> Result<(), anyhow::Error> {
    let server = TestSignalServer::builder().spawn().await?;
    let client = reqwest::Client::new();

    for path in ["/health", "/ready"] {
        let response = client
            .get(format!("{}{}", server.url(), path))
            .send()
            .await?;
        assert_eq!(response.status(), 200, "{path}");
    }
    Ok(())
}

#[tokio::test]
async fn test_ready_reports_shutdown() -> Result<(), anyhow::Error> {
    let server = TestSignalServer::builder().spawn().await?;
    server.state().health.set_not_ready();

    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), 503);

    let response = reqwest::get(format!("{}/health", server.url())).await?;
    assert_eq!(response.status(), 200);
    Ok(())
}

#[tokio::test]
async fn test_ready_false_once_sessions_are_shut_down() -> Result<(), anyhow::Error> {
    let server = TestSignalServer::builder().spawn().await?;
    let ready: serde_json::Value = reqwest::get(format!("{}/ready", server.url()))
        .await?
        .json()
        .await?;
    assert_eq!(ready["status"], "ready");
    assert_eq!(ready["sessions"], 0);

    server.shutdown_sessions();
    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), 503);
    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_renders_signal_metrics() {
    let handle = get_test_metrics_handle();
    let vars = HashMap::from([("SIGNAL_JWT_SECRET".to_string(), TEST_JWT_SECRET.to_string())]);
    let config = Config::from_vars(&vars).unwrap();
    let stores = Stores::from_backend(Arc::new(InMemoryStore::new()));
    let state = Arc::new(AppState::new(config, stores, CancellationToken::new()));
    let app = build_routes(state, Some(handle));

    metrics::record_quota_denied();
    metrics::record_envelope("message", "ok");

    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("signal_quota_denials_total"), "{text}");
    assert!(text.contains("signal_envelopes_total"), "{text}");
}
