//! Prometheus metrics for the experiment store
//!
//! - `abtest_persistence_calls_total{operation,outcome}` - backend calls by result
//! - `abtest_coalesced_writes_total` - updates absorbed by a pending write
//! - `abtest_pending_writes` - debounced writes waiting to be sent

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics registry plus the engine's collectors
pub struct EngineMetrics {
    registry: Registry,
    persistence_calls: IntCounterVec,
    coalesced_writes: IntCounter,
    pending_writes: IntGauge,
}

/// Metrics shared between the store and the HTTP surface
pub type SharedMetrics = Arc<EngineMetrics>;

/// Create the registry and register every collector
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    EngineMetrics::new().map(Arc::new)
}

impl EngineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let persistence_calls = IntCounterVec::new(
            Opts::new(
                "abtest_persistence_calls_total",
                "Experiment persistence calls by operation and outcome",
            ),
            &["operation", "outcome"],
        )?;
        let coalesced_writes = IntCounter::new(
            "abtest_coalesced_writes_total",
            "Experiment updates coalesced into an already pending write",
        )?;
        let pending_writes = IntGauge::new(
            "abtest_pending_writes",
            "Debounced experiment writes waiting to be sent",
        )?;

        registry.register(Box::new(persistence_calls.clone()))?;
        registry.register(Box::new(coalesced_writes.clone()))?;
        registry.register(Box::new(pending_writes.clone()))?;

        Ok(EngineMetrics {
            registry,
            persistence_calls,
            coalesced_writes,
            pending_writes,
        })
    }

    /// Record one backend call (`operation` is create/update/archive/delete/list)
    pub fn record_persistence(&self, operation: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.persistence_calls
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn record_coalesced(&self) {
        self.coalesced_writes.inc();
    }

    pub fn set_pending(&self, pending: usize) {
        self.pending_writes.set(pending as i64);
    }

    /// Encode every metric in the Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    #[cfg(test)]
    pub fn persistence_count(&self, operation: &str, outcome: &str) -> u64 {
        self.persistence_calls
            .with_label_values(&[operation, outcome])
            .get()
    }

    #[cfg(test)]
    pub fn coalesced_count(&self) -> u64 {
        self.coalesced_writes.get()
    }

    #[cfg(test)]
    pub fn pending_gauge(&self) -> i64 {
        self.pending_writes.get()
    }
}
