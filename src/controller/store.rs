//! Experiment store
//!
//! In-memory, authoritative-after-load collection of a game branch's
//! experiments, kept in sync with the persistence backend:
//!
//! - `create` is sent immediately and appended only after the backend accepts it
//! - edits apply locally at once and reach the backend through a per-experiment
//!   trailing debounce (full snapshot, last write wins)
//! - `archive` / `delete` are sent immediately and followed by a segment refresh

use crate::controller::debounce::{DebouncedAction, KeyedDebouncer};
use crate::controller::error::EngineError;
use crate::controller::lifecycle::{normalize_audience, normalize_overrides, LifecycleController};
use crate::controller::persistence::{ArchiveOptions, ExperimentBackend, Scope};
use crate::controller::segments::{NoOpSegmentDirectory, SegmentDirectory};
use crate::model::{ArchivedResult, ChangeSet, Experiment, Sample, SubjectType};
use crate::server::SharedMetrics;
use futures::FutureExt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default quiet window before an edited experiment is written
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

pub struct ExperimentStoreBuilder {
    backend: Arc<dyn ExperimentBackend>,
    scope: Scope,
    segments: Arc<dyn SegmentDirectory>,
    controller: Arc<LifecycleController>,
    debounce: Duration,
    metrics: Option<SharedMetrics>,
}

impl ExperimentStoreBuilder {
    pub fn segments(mut self, segments: Arc<dyn SegmentDirectory>) -> Self {
        self.segments = segments;
        self
    }

    pub fn controller(mut self, controller: Arc<LifecycleController>) -> Self {
        self.controller = controller;
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> ExperimentStore {
        let action: DebouncedAction<Experiment> = {
            let backend = self.backend.clone();
            let scope = self.scope.clone();
            let metrics = self.metrics.clone();
            Arc::new(move |id: String, experiment: Experiment| {
                let backend = backend.clone();
                let scope = scope.clone();
                let metrics = metrics.clone();
                async move {
                    let result = backend.update_experiment(&scope, &experiment).await;
                    if let Some(metrics) = &metrics {
                        metrics.record_persistence("update", result.is_ok());
                    }
                    match result {
                        Ok(()) => debug!(experiment = %id, "Debounced update written"),
                        // Not retried; the next edit schedules a fresh write
                        Err(e) => warn!(
                            experiment = %id,
                            error = %e,
                            "Debounced update failed, local edits not persisted"
                        ),
                    }
                }
                .boxed()
            })
        };

        ExperimentStore {
            backend: self.backend,
            scope: self.scope,
            segments: self.segments,
            controller: self.controller,
            experiments: RwLock::new(Vec::new()),
            debouncer: KeyedDebouncer::new(self.debounce, action),
            metrics: self.metrics,
        }
    }
}

pub struct ExperimentStore {
    backend: Arc<dyn ExperimentBackend>,
    scope: Scope,
    segments: Arc<dyn SegmentDirectory>,
    controller: Arc<LifecycleController>,
    experiments: RwLock<Vec<Experiment>>,
    debouncer: KeyedDebouncer<Experiment>,
    metrics: Option<SharedMetrics>,
}

/// Reject a raw full-snapshot update that bypasses the lifecycle rules
///
/// Lifecycle fields move only through lifecycle operations, and a launched
/// experiment keeps its audience and subject identity.
fn check_raw_update(current: &Experiment, next: &Experiment) -> Result<(), EngineError> {
    if current.archived {
        return Err(EngineError::invalid(format!(
            "experiment {} is archived",
            current.id
        )));
    }
    if next.start_date != current.start_date
        || next.archived != current.archived
        || next.removed != current.removed
        || next.archived_result != current.archived_result
        || next.archived_samples != current.archived_samples
    {
        return Err(EngineError::invalid(
            "lifecycle fields change only through start, archive and delete",
        ));
    }
    if next.change_sets.is_empty() {
        return Err(EngineError::validation(
            "an experiment needs at least one change set",
        ));
    }
    if current.is_draft() {
        if next.paused {
            return Err(EngineError::invalid("a draft cannot be paused"));
        }
        return Ok(());
    }

    if next.audience != current.audience {
        return Err(EngineError::invalid(format!(
            "audience of experiment {} is locked since launch",
            current.id
        )));
    }
    if subject_identity(&next.change_sets) != subject_identity(&current.change_sets) {
        return Err(EngineError::invalid(format!(
            "change set subjects of experiment {} are locked since launch",
            current.id
        )));
    }
    Ok(())
}

fn subject_identity(change_sets: &[ChangeSet]) -> Vec<(&str, SubjectType, &str)> {
    change_sets
        .iter()
        .map(|cs| (cs.id.as_str(), cs.subject_type, cs.subject_id.as_str()))
        .collect()
}

/// Bring a client-supplied snapshot in line with what the setters allow
///
/// Audience and content amounts are clamped with a warning. Offer override
/// keys outside icon, price and content are rejected, and so are subject
/// types this edition does not offer (unless `previous` already had them).
fn normalize_snapshot(
    experiment: &mut Experiment,
    previous: Option<&Experiment>,
    controller: &LifecycleController,
) -> Result<(), EngineError> {
    if normalize_audience(&mut experiment.audience) {
        warn!(
            experiment = %experiment.id,
            share = experiment.audience.test_share,
            segment = %experiment.audience.control,
            "Audience normalized to one base segment and a clamped share"
        );
    }

    for change_set in &mut experiment.change_sets {
        let known = previous.is_some_and(|previous| {
            previous
                .change_sets
                .iter()
                .any(|cs| cs.id == change_set.id && cs.subject_type == change_set.subject_type)
        });
        if !known && !controller.features().allows_subject(change_set.subject_type) {
            return Err(EngineError::invalid(format!(
                "{} subjects are not available in this edition",
                change_set.subject_type
            )));
        }
        if normalize_overrides(change_set)? {
            warn!(
                experiment = %experiment.id,
                change_set = %change_set.id,
                "Override values sanitized"
            );
        }
    }
    Ok(())
}

/// Repair a record loaded from storage; returns true when it changed
fn normalize_loaded(experiment: &mut Experiment, controller: &LifecycleController) -> bool {
    let mut changed = normalize_audience(&mut experiment.audience);
    if experiment.change_sets.is_empty() {
        experiment
            .change_sets
            .push(ChangeSet::new(controller.features().default_subject_type()));
        changed = true;
    }
    changed
}

impl ExperimentStore {
    pub fn builder(backend: Arc<dyn ExperimentBackend>, scope: Scope) -> ExperimentStoreBuilder {
        ExperimentStoreBuilder {
            backend,
            scope,
            segments: Arc::new(NoOpSegmentDirectory),
            controller: Arc::new(LifecycleController::default()),
            debounce: DEFAULT_DEBOUNCE,
            metrics: None,
        }
    }

    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Experiment>> {
        self.experiments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Experiment>> {
        self.experiments
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, operation: &str, success: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_persistence(operation, success);
        }
    }

    /// Push the pending-write count into the gauge
    pub fn sync_metrics(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.set_pending(self.debouncer.pending_count());
        }
    }

    /// Fetch the branch's experiments and replace the cache
    ///
    /// Experiments with an unsent edit keep their local copy.
    pub async fn list(&self) -> Result<Vec<Experiment>, EngineError> {
        let result = self.backend.list_experiments(&self.scope).await;
        self.record("list", result.is_ok());
        let loaded = result?;

        let mut experiments = Vec::with_capacity(loaded.len());
        for mut experiment in loaded.into_iter().filter(|e| !e.removed) {
            if let Some(local) = self.debouncer.pending_value(&experiment.id) {
                experiments.push(local);
                continue;
            }
            if normalize_loaded(&mut experiment, &self.controller) {
                warn!(experiment = %experiment.id, "Normalized legacy experiment record");
            }
            experiments.push(experiment);
        }

        info!(
            game = %self.scope.game_id,
            branch = %self.scope.branch,
            count = experiments.len(),
            "Experiments loaded"
        );
        *self.write() = experiments.clone();
        Ok(experiments)
    }

    /// Cached experiments
    pub fn experiments(&self) -> Vec<Experiment> {
        self.read().clone()
    }

    pub fn get(&self, id: &str) -> Option<Experiment> {
        self.read().iter().find(|e| e.id == id).cloned()
    }

    /// A fresh Draft, not yet persisted
    pub fn new_draft(&self) -> Experiment {
        self.controller.create()
    }

    /// Persist a Draft and append it once the backend accepts it
    pub async fn create(&self, mut experiment: Experiment) -> Result<Experiment, EngineError> {
        if !experiment.is_draft() {
            return Err(EngineError::invalid(format!(
                "only drafts can be created, experiment {} is {}",
                experiment.id,
                experiment.state()
            )));
        }
        if experiment.change_sets.is_empty() {
            return Err(EngineError::validation(
                "an experiment needs at least one change set",
            ));
        }
        if self.get(&experiment.id).is_some() {
            return Err(EngineError::invalid(format!(
                "experiment {} already exists",
                experiment.id
            )));
        }
        normalize_snapshot(&mut experiment, None, &self.controller)?;

        let result = self
            .backend
            .create_experiment(&self.scope, &experiment)
            .await;
        self.record("create", result.is_ok());
        result?;

        info!(experiment = %experiment.id, "Experiment created");
        self.write().push(experiment.clone());
        Ok(experiment)
    }

    /// Replace an experiment with a full snapshot
    ///
    /// Applied locally at once; the backend write is debounced. Rejects
    /// snapshots that change lifecycle fields or, once launched, audience
    /// and subject identity. Out-of-range values are clamped the way the
    /// setters clamp them.
    pub fn update(&self, mut experiment: Experiment) -> Result<(), EngineError> {
        let current = self
            .get(&experiment.id)
            .ok_or_else(|| EngineError::ExperimentNotFound(experiment.id.clone()))?;
        check_raw_update(&current, &experiment)?;
        normalize_snapshot(&mut experiment, Some(&current), &self.controller)?;
        self.schedule(experiment);
        Ok(())
    }

    /// Apply a lifecycle mutation to a cached experiment
    ///
    /// The closure runs on a copy; a rejected mutation leaves the cache
    /// untouched and schedules nothing. Archive and delete are not edits.
    pub fn edit<R, F>(&self, id: &str, mutate: F) -> Result<(R, Experiment), EngineError>
    where
        F: FnOnce(&LifecycleController, &mut Experiment) -> Result<R, EngineError>,
    {
        let current = self
            .get(id)
            .ok_or_else(|| EngineError::ExperimentNotFound(id.to_string()))?;

        let mut next = current.clone();
        let output = mutate(&self.controller, &mut next)?;

        if next.archived != current.archived || next.removed != current.removed {
            return Err(EngineError::invalid(
                "archive and delete go through the store, not edit",
            ));
        }
        if next != current {
            self.schedule(next.clone());
        }
        Ok((output, next))
    }

    fn schedule(&self, experiment: Experiment) {
        {
            let mut experiments = self.write();
            if let Some(slot) = experiments.iter_mut().find(|e| e.id == experiment.id) {
                *slot = experiment.clone();
            }
        }

        let id = experiment.id.clone();
        if self.debouncer.schedule(id.clone(), experiment) {
            debug!(experiment = %id, "Pending write replaced");
            if let Some(metrics) = &self.metrics {
                metrics.record_coalesced();
            }
        }
        self.sync_metrics();
    }

    /// Stop and archive a launched experiment
    ///
    /// Any pending debounced write is superseded by the archive call, which
    /// carries the latest local snapshot; a write already on the wire is
    /// awaited first so it cannot land after the archive. `rollout` promotes
    /// the test configuration and is only legal for a successful result.
    pub async fn archive(
        &self,
        id: &str,
        result: ArchivedResult,
        snapshot: Vec<Sample>,
        rollout: bool,
    ) -> Result<Experiment, EngineError> {
        if rollout && result != ArchivedResult::Success {
            return Err(EngineError::validation(
                "shouldRollout requires archivedResult success",
            ));
        }
        let _exclusive = self.debouncer.exclusive(id).await;
        let mut experiment = self
            .get(id)
            .ok_or_else(|| EngineError::ExperimentNotFound(id.to_string()))?;
        self.controller
            .stop_and_archive(&mut experiment, result, snapshot)?;

        self.send_terminal(experiment, ArchiveOptions::archive(result, rollout))
            .await
    }

    /// Stop an experiment and delete it permanently
    pub async fn delete(&self, id: &str) -> Result<Experiment, EngineError> {
        let _exclusive = self.debouncer.exclusive(id).await;
        let mut experiment = self
            .get(id)
            .ok_or_else(|| EngineError::ExperimentNotFound(id.to_string()))?;
        self.controller.stop_and_delete(&mut experiment)?;

        self.send_terminal(experiment, ArchiveOptions::delete()).await
    }

    /// Callers hold the experiment's `exclusive` guard
    async fn send_terminal(
        &self,
        experiment: Experiment,
        options: ArchiveOptions,
    ) -> Result<Experiment, EngineError> {
        let operation = options.operation();
        let superseded = self.debouncer.cancel(&experiment.id);

        let result = self
            .backend
            .archive_or_delete_experiment(&self.scope, &experiment, options)
            .await;
        self.record(operation, result.is_ok());

        if let Err(e) = result {
            // Memory is unchanged, so the unsent edit is still owed
            if let Some(pending) = superseded {
                if !self.debouncer.is_pending(&experiment.id) {
                    self.debouncer.schedule(experiment.id.clone(), pending);
                }
            }
            self.sync_metrics();
            warn!(experiment = %experiment.id, operation, error = %e, "Terminal call failed");
            return Err(e.into());
        }

        // Edits that slipped in during the call describe a stopped experiment
        if self.debouncer.cancel(&experiment.id).is_some() {
            debug!(experiment = %experiment.id, "Dropped write queued behind terminal call");
        }
        {
            let mut experiments = self.write();
            if options.should_archive {
                if let Some(slot) = experiments.iter_mut().find(|e| e.id == experiment.id) {
                    *slot = experiment.clone();
                }
            } else {
                experiments.retain(|e| e.id != experiment.id);
            }
        }
        self.sync_metrics();
        info!(
            experiment = %experiment.id,
            operation,
            rollout = options.should_rollout,
            "Experiment stopped"
        );

        // The synthetic segment of the experiment is gone now
        if let Err(e) = self.segments.refresh(&self.scope).await {
            warn!(experiment = %experiment.id, error = %e, "Segment refresh failed");
        }
        Ok(experiment)
    }

    /// Send every pending write now
    pub async fn flush(&self) -> usize {
        let flushed = self.debouncer.flush().await;
        self.sync_metrics();
        if flushed > 0 {
            info!(count = flushed, "Flushed pending experiment writes");
        }
        flushed
    }

    pub fn pending_writes(&self) -> usize {
        self.debouncer.pending_count()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.debouncer.is_pending(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "store_test.rs"]
mod tests;
