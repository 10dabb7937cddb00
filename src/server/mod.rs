//! HTTP surface of the experiment service
//!
//! - `/healthz`, `/readyz` - probes
//! - `/metrics` - Prometheus metrics
//! - `/experiments/...` - experiment API
//!
//! Also provides graceful shutdown handling for SIGTERM/SIGINT.

mod api;
mod health;
pub mod metrics;
pub mod shutdown;

pub use api::{ApiError, ExperimentView};
pub use health::{build_router, run_server, AppState, ReadinessState};
pub use metrics::{create_metrics, EngineMetrics, SharedMetrics};
pub use shutdown::{shutdown_channel, wait_for_signal, ShutdownController, ShutdownSignal};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "health_test.rs"]
mod health_tests;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "api_test.rs"]
mod api_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;
