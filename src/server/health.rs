//! HTTP server: probes, metrics and the experiment API
//!
//! - `/healthz` - Liveness: is the process alive?
//! - `/readyz` - Readiness: are experiments loaded?
//! - `/metrics` - Prometheus metrics in text format
//! - `/experiments/...` - experiment API (see `api`)

use crate::controller::{ExperimentStore, ResultsProjection};
use crate::server::metrics::SharedMetrics;
use crate::server::shutdown::ShutdownSignal;
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Shared state for readiness tracking
///
/// Set to ready once the experiment list has been loaded, and back to not
/// ready when shutdown starts.
#[derive(Debug, Clone)]
pub struct ReadinessState {
    ready: Arc<std::sync::atomic::AtomicBool>,
}

impl ReadinessState {
    /// Create a new readiness state (initially not ready)
    pub fn new() -> Self {
        Self {
            ready: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub fn set_ready(&self) {
        self.ready.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Mark as not ready (e.g., during shutdown)
    pub fn set_not_ready(&self) {
        self.ready.store(false, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Default for ReadinessState {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub readiness: ReadinessState,
    pub metrics: SharedMetrics,
    pub store: Arc<ExperimentStore>,
    pub results: Arc<ResultsProjection>,
}

impl AppState {
    pub fn new(
        readiness: ReadinessState,
        metrics: SharedMetrics,
        store: Arc<ExperimentStore>,
        results: Arc<ResultsProjection>,
    ) -> Self {
        Self {
            readiness,
            metrics,
            store,
            results,
        }
    }
}

/// Liveness probe handler
///
/// Always returns 200 OK - if this responds, the process is alive.
async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe handler
async fn readyz(State(state): State<AppState>) -> StatusCode {
    if state.readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Prometheus metrics handler
async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.store.sync_metrics();
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

/// Build the router for probes, metrics and the experiment API
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(self::metrics))
        .merge(super::api::routes())
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` fires
///
/// In-flight requests finish before this returns.
pub async fn run_server(
    listener: TcpListener,
    state: AppState,
    mut shutdown: ShutdownSignal,
) -> Result<(), std::io::Error> {
    let app = build_router(state);

    // Log after successful bind - server is actually listening
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Experiment server listening (HTTP)");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
}
