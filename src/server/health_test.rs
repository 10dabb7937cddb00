//! Tests for probe and metrics endpoints

use super::*;
use crate::controller::persistence::{MockBackend, Scope};
use crate::controller::results::NoOpSampleSource;
use crate::controller::{ExperimentStore, ResultsProjection};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

struct TestServer {
    addr: SocketAddr,
    readiness: ReadinessState,
    shutdown: ShutdownController,
    handle: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

async fn start_server() -> TestServer {
    let scope = Scope::new("game-1", "development");
    let metrics = create_metrics().unwrap();
    let store = ExperimentStore::builder(Arc::new(MockBackend::new()), scope.clone())
        .metrics(metrics.clone())
        .build();
    let results = ResultsProjection::new(Arc::new(NoOpSampleSource), scope);
    let readiness = ReadinessState::new();
    let state = AppState::new(
        readiness.clone(),
        metrics,
        Arc::new(store),
        Arc::new(results),
    );

    // Port 0 avoids collisions between parallel tests
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, signal) = shutdown_channel();
    let handle = tokio::spawn(run_server(listener, state, signal));

    TestServer {
        addr,
        readiness,
        shutdown,
        handle,
    }
}

async fn get(server: &TestServer, path: &str) -> reqwest::Response {
    reqwest::Client::new()
        .get(format!("http://{}{}", server.addr, path))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to reach server")
}

#[tokio::test]
async fn test_healthz_returns_200() {
    let server = start_server().await;
    let response = get(&server, "/healthz").await;
    assert_eq!(response.status(), 200, "Liveness probe should return 200");
    server.handle.abort();
}

#[tokio::test]
async fn test_readyz_follows_readiness_state() {
    let server = start_server().await;

    let response = get(&server, "/readyz").await;
    assert_eq!(response.status(), 503, "Not ready before experiments load");

    server.readiness.set_ready();
    let response = get(&server, "/readyz").await;
    assert_eq!(response.status(), 200);

    server.readiness.set_not_ready();
    let response = get(&server, "/readyz").await;
    assert_eq!(response.status(), 503, "Not ready once shutdown starts");

    server.handle.abort();
}

#[tokio::test]
async fn test_metrics_endpoint_serves_text_format() {
    let server = start_server().await;

    let response = get(&server, "/metrics").await;
    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = response.text().await.unwrap();
    assert!(body.contains("abtest_pending_writes 0"));

    server.handle.abort();
}

#[tokio::test]
async fn test_server_stops_on_shutdown_signal() {
    let server = start_server().await;
    assert_eq!(get(&server, "/healthz").await.status(), 200);

    server.shutdown.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server did not stop after shutdown");
    assert!(result.unwrap().is_ok());
}

#[test]
fn test_readiness_state_default_not_ready() {
    let readiness = ReadinessState::default();
    assert!(!readiness.is_ready());
    let clone = readiness.clone();
    readiness.set_ready();
    assert!(clone.is_ready(), "clones share one flag");
}
