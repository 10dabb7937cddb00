//! Results projection
//!
//! Produces the control-vs-test time series shown for an experiment. Live
//! experiments read from the analytics sample source; archived experiments
//! replay the snapshot frozen at archive time. No statistics are computed.

use crate::controller::persistence::Scope;
use crate::model::{Experiment, ExperimentState, Sample};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SampleSourceError {
    #[error("Sample source HTTP error: {0}")]
    Http(String),

    #[error("Failed to parse samples: {0}")]
    ParseError(String),
}

/// Trait for the live analytics feed
#[async_trait]
pub trait SampleSource: Send + Sync {
    async fn samples(
        &self,
        scope: &Scope,
        experiment: &Experiment,
    ) -> Result<Vec<Sample>, SampleSourceError>;
}

/// Source with no analytics configured; always empty
pub struct NoOpSampleSource;

#[async_trait]
impl SampleSource for NoOpSampleSource {
    async fn samples(
        &self,
        _scope: &Scope,
        _experiment: &Experiment,
    ) -> Result<Vec<Sample>, SampleSourceError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct SamplesResponse {
    success: bool,
    #[serde(default)]
    samples: Vec<Sample>,
}

/// Sample source backed by the `getExperimentSamples` call
pub struct HttpSampleSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSampleSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SampleSourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SampleSourceError::Http(format!("Failed to build client: {}", e)))?;
        Ok(HttpSampleSource {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

/// Parse a samples response body
fn parse_samples(body: &str) -> Result<Vec<Sample>, SampleSourceError> {
    let response: SamplesResponse = serde_json::from_str(body)
        .map_err(|e| SampleSourceError::ParseError(format!("Invalid JSON: {}", e)))?;
    if !response.success {
        return Err(SampleSourceError::Http(
            "getExperimentSamples returned success=false".to_string(),
        ));
    }
    Ok(response.samples)
}

#[async_trait]
impl SampleSource for HttpSampleSource {
    async fn samples(
        &self,
        scope: &Scope,
        experiment: &Experiment,
    ) -> Result<Vec<Sample>, SampleSourceError> {
        let url = format!("{}/getExperimentSamples", self.base_url);
        let metrics: Vec<&str> = experiment
            .observed_metrics
            .iter()
            .map(|m| m.metric_id.as_str())
            .collect();

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "gameID": scope.game_id,
                "branch": scope.branch,
                "experimentID": experiment.id,
                "startDate": experiment.start_date,
                "metrics": metrics,
            }))
            .send()
            .await
            .map_err(|e| SampleSourceError::Http(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SampleSourceError::Http(format!(
                "getExperimentSamples returned HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SampleSourceError::Http(format!("Failed to read body: {}", e)))?;
        parse_samples(&body)
    }
}

/// Mock sample source for testing - returns fixed samples
#[cfg(test)]
pub struct MockSampleSource {
    samples: Vec<Sample>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockSampleSource {
    pub fn new(samples: Vec<Sample>) -> Self {
        MockSampleSource {
            samples,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl SampleSource for MockSampleSource {
    async fn samples(
        &self,
        _scope: &Scope,
        _experiment: &Experiment,
    ) -> Result<Vec<Sample>, SampleSourceError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.samples.clone())
    }
}

/// Read-only view of an experiment's results
pub struct ResultsProjection {
    source: std::sync::Arc<dyn SampleSource>,
    scope: Scope,
}

impl ResultsProjection {
    pub fn new(source: std::sync::Arc<dyn SampleSource>, scope: Scope) -> Self {
        ResultsProjection { source, scope }
    }

    /// Control-vs-test series, ordered by timestamp
    ///
    /// Drafts have no series. Archived experiments return their frozen
    /// snapshot without touching the live source.
    pub async fn time_series(
        &self,
        experiment: &Experiment,
    ) -> Result<Vec<Sample>, SampleSourceError> {
        let mut samples = match experiment.state() {
            ExperimentState::Draft => return Ok(Vec::new()),
            ExperimentState::Archived => experiment.archived_samples.clone(),
            ExperimentState::Running | ExperimentState::Paused => {
                self.source.samples(&self.scope, experiment).await?
            }
        };
        samples.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(samples)
    }

    /// Live series used as the archive snapshot
    ///
    /// A failing source yields an empty snapshot rather than blocking the
    /// archive.
    pub async fn snapshot(&self, experiment: &Experiment) -> Vec<Sample> {
        match self.time_series(experiment).await {
            Ok(samples) => samples,
            Err(e) => {
                warn!(
                    experiment = %experiment.id,
                    error = %e,
                    "Failed to read samples for archive snapshot"
                );
                Vec::new()
            }
        }
    }
}
