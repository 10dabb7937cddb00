use abtest_engine::config::EngineConfig;
use abtest_engine::controller::catalog::InMemoryOfferCatalog;
use abtest_engine::controller::clock::SystemClock;
use abtest_engine::controller::results::HttpSampleSource;
use abtest_engine::controller::segments::HttpSegmentDirectory;
use abtest_engine::controller::{
    ExperimentStore, HttpBackend, LifecycleController, ResultsProjection, Scope,
};
use abtest_engine::server::{
    create_metrics, run_server, shutdown_channel, wait_for_signal, AppState, ReadinessState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting A/B experiment engine");

    let config = match EngineConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    let scope = Scope::new(config.game_id.clone(), config.branch.clone());
    info!(
        game = %scope.game_id,
        branch = %scope.branch,
        backend = %config.backend_url,
        debounce_ms = config.debounce.as_millis() as u64,
        "Configuration loaded"
    );

    let (shutdown_controller, shutdown_signal) = shutdown_channel();

    // Initially not ready; flips once experiments are loaded
    let readiness = ReadinessState::new();

    let metrics = create_metrics()?;
    info!("Prometheus metrics registry initialized");

    let backend = Arc::new(HttpBackend::new(
        config.backend_url.clone(),
        config.request_timeout,
    )?);

    // Offer catalog snapshot used to seed offer overrides
    let catalog = Arc::new(InMemoryOfferCatalog::new());
    if config.features.offers_enabled {
        match backend.fetch_offers(&scope).await {
            Ok(offers) => {
                info!(count = offers.len(), "Offer catalog loaded");
                catalog.replace_all(offers);
            }
            Err(e) => warn!(error = %e, "Offer catalog unavailable, offer overrides seed empty"),
        }
    }

    let controller = Arc::new(LifecycleController::new(
        Arc::new(SystemClock),
        config.features.clone(),
        catalog,
    ));
    let segments = Arc::new(HttpSegmentDirectory::new(
        config.backend_url.clone(),
        config.request_timeout,
    )?);
    let store = Arc::new(
        ExperimentStore::builder(backend, scope.clone())
            .segments(segments)
            .controller(controller)
            .debounce(config.debounce)
            .metrics(metrics.clone())
            .build(),
    );
    let samples = Arc::new(HttpSampleSource::new(
        config.backend_url.clone(),
        config.request_timeout,
    )?);
    let results = Arc::new(ResultsProjection::new(samples, scope));

    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], config.port))).await?;
    let state = AppState::new(readiness.clone(), metrics, store.clone(), results);
    let server_handle = tokio::spawn(run_server(listener, state, shutdown_signal));
    info!(port = config.port, "Server task spawned");

    match store.list().await {
        Ok(experiments) => {
            readiness.set_ready();
            info!(count = experiments.len(), "Engine ready");
        }
        Err(e) => {
            error!(error = %e, "Failed to load experiments");
            shutdown_controller.shutdown();
            return Err(e.into());
        }
    }

    match wait_for_signal().await {
        Ok(signal) => info!(signal = signal, "Initiating graceful shutdown"),
        Err(e) => warn!(error = %e, "Signal handler failed, shutting down"),
    }

    // Stop taking traffic, let in-flight requests finish
    readiness.set_not_ready();
    shutdown_controller.shutdown();
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Server stopped with error"),
        Err(e) => warn!(error = %e, "Server task failed"),
    }

    // Edits still inside their debounce window would be lost otherwise
    let flushed = store.flush().await;
    info!(flushed, "Experiment engine shut down gracefully");
    Ok(())
}
