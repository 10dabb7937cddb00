//! Persistence backend for experiments
//!
//! The backing service exposes four calls, each scoped by game and branch and
//! each answering `{ success, ... }`. `success: false` is a failure just like
//! a transport error.

use crate::controller::catalog::Offer;
use crate::model::{ArchivedResult, Experiment};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend HTTP error: {0}")]
    Http(String),

    #[error("Backend rejected {operation} (success=false)")]
    Rejected { operation: &'static str },

    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),
}

/// Game and branch every backend call is scoped to
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Scope {
    #[serde(rename = "gameID")]
    pub game_id: String,
    pub branch: String,
}

impl Scope {
    pub fn new(game_id: impl Into<String>, branch: impl Into<String>) -> Self {
        Scope {
            game_id: game_id.into(),
            branch: branch.into(),
        }
    }
}

/// Options of an archive-or-delete call
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// true archives, false deletes
    #[serde(rename = "shouldArchive")]
    pub should_archive: bool,

    #[serde(rename = "archivedResult")]
    pub archived_result: ArchivedResult,

    /// Promote the test configuration to everyone (success only)
    #[serde(rename = "shouldRollout")]
    pub should_rollout: bool,
}

impl ArchiveOptions {
    pub fn archive(result: ArchivedResult, rollout: bool) -> Self {
        ArchiveOptions {
            should_archive: true,
            archived_result: result,
            should_rollout: rollout,
        }
    }

    pub fn delete() -> Self {
        ArchiveOptions {
            should_archive: false,
            archived_result: ArchivedResult::Unset,
            should_rollout: false,
        }
    }

    pub fn operation(&self) -> &'static str {
        if self.should_archive {
            "archive"
        } else {
            "delete"
        }
    }
}

/// Trait for the experiment persistence service
///
/// Production code uses `HttpBackend`. Tests use `MockBackend`, which records
/// every call in memory for assertions.
#[async_trait]
pub trait ExperimentBackend: Send + Sync {
    async fn list_experiments(&self, scope: &Scope) -> Result<Vec<Experiment>, BackendError>;

    async fn create_experiment(
        &self,
        scope: &Scope,
        experiment: &Experiment,
    ) -> Result<(), BackendError>;

    /// Full-snapshot write; last write wins
    async fn update_experiment(
        &self,
        scope: &Scope,
        experiment: &Experiment,
    ) -> Result<(), BackendError>;

    async fn archive_or_delete_experiment(
        &self,
        scope: &Scope,
        experiment: &Experiment,
        options: ArchiveOptions,
    ) -> Result<(), BackendError>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(flatten)]
    rest: serde_json::Map<String, Value>,
}

/// Backend client that POSTs JSON to `{base_url}/{operation}`
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Http(format!("Failed to build client: {}", e)))?;
        Ok(HttpBackend {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn call(&self, operation: &'static str, body: Value) -> Result<Envelope, BackendError> {
        let url = format!("{}/{}", self.base_url, operation);
        debug!(operation, url = %url, "Backend call");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Http(format!("{} failed: {}", operation, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Http(format!(
                "{} returned HTTP {}",
                operation, status
            )));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("{}: {}", operation, e)))?;

        if !envelope.success {
            return Err(BackendError::Rejected { operation });
        }
        Ok(envelope)
    }

    /// Fetch the offer catalog for the scope
    ///
    /// Used once at startup to fill the in-memory catalog.
    pub async fn fetch_offers(&self, scope: &Scope) -> Result<Vec<Offer>, BackendError> {
        let envelope = self
            .call(
                "getOffers",
                json!({ "gameID": scope.game_id, "branch": scope.branch }),
            )
            .await?;
        field(envelope, "offers")
    }
}

/// Pull a typed field out of a success envelope; a missing field is empty
fn field<T: DeserializeOwned + Default>(envelope: Envelope, name: &str) -> Result<T, BackendError> {
    match envelope.rest.get(name) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| BackendError::InvalidResponse(format!("Invalid '{}': {}", name, e))),
    }
}

#[async_trait]
impl ExperimentBackend for HttpBackend {
    async fn list_experiments(&self, scope: &Scope) -> Result<Vec<Experiment>, BackendError> {
        let envelope = self
            .call(
                "listExperiments",
                json!({ "gameID": scope.game_id, "branch": scope.branch }),
            )
            .await?;
        field(envelope, "experiments")
    }

    async fn create_experiment(
        &self,
        scope: &Scope,
        experiment: &Experiment,
    ) -> Result<(), BackendError> {
        self.call(
            "createExperiment",
            json!({
                "gameID": scope.game_id,
                "branch": scope.branch,
                "experiment": experiment,
            }),
        )
        .await?;
        Ok(())
    }

    async fn update_experiment(
        &self,
        scope: &Scope,
        experiment: &Experiment,
    ) -> Result<(), BackendError> {
        self.call(
            "updateExperiment",
            json!({
                "gameID": scope.game_id,
                "branch": scope.branch,
                "experiment": experiment,
            }),
        )
        .await?;
        Ok(())
    }

    async fn archive_or_delete_experiment(
        &self,
        scope: &Scope,
        experiment: &Experiment,
        options: ArchiveOptions,
    ) -> Result<(), BackendError> {
        self.call(
            "archiveOrDeleteExperiment",
            json!({
                "gameID": scope.game_id,
                "branch": scope.branch,
                "experiment": experiment,
                "shouldArchive": options.should_archive,
                "archivedResult": options.archived_result,
                "shouldRollout": options.should_rollout,
            }),
        )
        .await?;
        Ok(())
    }
}

/// A call recorded by `MockBackend`
#[cfg(test)]
#[derive(Debug, Clone)]
pub enum BackendCall {
    List,
    Create(Experiment),
    Update {
        experiment: Experiment,
        at: tokio::time::Instant,
    },
    ArchiveOrDelete {
        experiment: Experiment,
        options: ArchiveOptions,
    },
}

/// Mock backend for testing - records calls in memory
#[cfg(test)]
#[derive(Default)]
pub struct MockBackend {
    experiments: std::sync::Mutex<Vec<Experiment>>,
    calls: std::sync::Mutex<Vec<BackendCall>>,
    fail_create: std::sync::atomic::AtomicBool,
    fail_update: std::sync::atomic::AtomicBool,
    fail_archive: std::sync::atomic::AtomicBool,
    update_delay_ms: std::sync::atomic::AtomicU64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_experiments(experiments: Vec<Experiment>) -> Self {
        let backend = Self::new();
        *backend.experiments.lock().unwrap() = experiments;
        backend
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set_fail_update(&self, fail: bool) {
        self.fail_update
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set_fail_archive(&self, fail: bool) {
        self.fail_archive
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Make every `update_experiment` take this long before it lands
    pub fn set_update_delay(&self, delay: Duration) {
        self.update_delay_ms
            .store(delay.as_millis() as u64, std::sync::atomic::Ordering::SeqCst);
    }

    /// The backend's copy of an experiment
    pub fn stored(&self, id: &str) -> Option<Experiment> {
        self.experiments
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Snapshots sent through `update_experiment`, in order
    pub fn updates(&self) -> Vec<(Experiment, tokio::time::Instant)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Update { experiment, at } => Some((experiment, at)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[async_trait]
impl ExperimentBackend for MockBackend {
    async fn list_experiments(&self, _scope: &Scope) -> Result<Vec<Experiment>, BackendError> {
        self.record(BackendCall::List);
        Ok(self.experiments.lock().unwrap().clone())
    }

    async fn create_experiment(
        &self,
        _scope: &Scope,
        experiment: &Experiment,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Create(experiment.clone()));
        if self.fail_create.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(BackendError::Rejected {
                operation: "createExperiment",
            });
        }
        self.experiments.lock().unwrap().push(experiment.clone());
        Ok(())
    }

    async fn update_experiment(
        &self,
        _scope: &Scope,
        experiment: &Experiment,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Update {
            experiment: experiment.clone(),
            at: tokio::time::Instant::now(),
        });
        let delay = self
            .update_delay_ms
            .load(std::sync::atomic::Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_update.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(BackendError::Rejected {
                operation: "updateExperiment",
            });
        }
        let mut stored = self.experiments.lock().unwrap();
        if let Some(existing) = stored.iter_mut().find(|e| e.id == experiment.id) {
            *existing = experiment.clone();
        }
        Ok(())
    }

    async fn archive_or_delete_experiment(
        &self,
        _scope: &Scope,
        experiment: &Experiment,
        options: ArchiveOptions,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::ArchiveOrDelete {
            experiment: experiment.clone(),
            options,
        });
        if self.fail_archive.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(BackendError::Rejected {
                operation: "archiveOrDeleteExperiment",
            });
        }
        let mut stored = self.experiments.lock().unwrap();
        if options.should_archive {
            if let Some(existing) = stored.iter_mut().find(|e| e.id == experiment.id) {
                *existing = experiment.clone();
            }
        } else {
            stored.retain(|e| e.id != experiment.id);
        }
        Ok(())
    }
}
