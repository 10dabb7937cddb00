use crate::config::FeatureConfig;
use crate::controller::catalog::{InMemoryOfferCatalog, OfferCatalog};
use crate::controller::clock::{iso_timestamp, Clock, SystemClock};
use crate::controller::error::EngineError;
use crate::model::{
    ArchivedResult, Audience, ChangeSet, Experiment, ObservedMetric, Sample, MIN_TEST_SHARE,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Whether an experiment's audience and subject identity may still change
///
/// True exactly while the experiment is a Draft. Always derived from
/// `startDate`, never cached: launching flips it permanently.
pub fn is_editable(experiment: &Experiment) -> bool {
    experiment.start_date.is_empty()
}

/// Reject the mutation unless the experiment is still a Draft
pub(crate) fn ensure_editable(experiment: &Experiment, action: &str) -> Result<(), EngineError> {
    ensure_not_archived(experiment, action)?;
    if !is_editable(experiment) {
        return Err(EngineError::invalid(format!(
            "cannot {} on experiment {}: locked since launch at {}",
            action, experiment.id, experiment.start_date
        )));
    }
    Ok(())
}

/// Reject the mutation on archived experiments
pub(crate) fn ensure_not_archived(
    experiment: &Experiment,
    action: &str,
) -> Result<(), EngineError> {
    if experiment.archived {
        return Err(EngineError::invalid(format!(
            "cannot {} on experiment {}: archived as {}",
            action, experiment.id, experiment.archived_result
        )));
    }
    Ok(())
}

/// Lifecycle controller
///
/// Enforces legal state transitions and the field-mutability rules derived
/// from an experiment's state. Every method validates before mutating, so a
/// rejected call leaves the experiment untouched.
pub struct LifecycleController {
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) features: FeatureConfig,
    pub(crate) catalog: Arc<dyn OfferCatalog>,
}

impl Default for LifecycleController {
    fn default() -> Self {
        LifecycleController::new(
            Arc::new(SystemClock),
            FeatureConfig::default(),
            Arc::new(InMemoryOfferCatalog::new()),
        )
    }
}

impl LifecycleController {
    pub fn new(
        clock: Arc<dyn Clock>,
        features: FeatureConfig,
        catalog: Arc<dyn OfferCatalog>,
    ) -> Self {
        LifecycleController {
            clock,
            features,
            catalog,
        }
    }

    pub fn features(&self) -> &FeatureConfig {
        &self.features
    }

    /// Build a new Draft
    ///
    /// Seeds one empty ChangeSet, a 10% test share and the "everyone" base
    /// segment. Pure construction; persisting it is the store's job.
    pub fn create(&self) -> Experiment {
        Experiment {
            id: uuid::Uuid::new_v4().to_string(),
            codename: String::new(),
            name: String::new(),
            comment: String::new(),
            audience: Audience::default(),
            observed_metrics: Vec::new(),
            change_sets: vec![ChangeSet::new(self.features.default_subject_type())],
            sample_size: 0,
            start_date: String::new(),
            paused: false,
            removed: false,
            archived: false,
            archived_result: ArchivedResult::Unset,
            archived_samples: Vec::new(),
        }
    }

    /// Launch a Draft
    ///
    /// Sets `startDate` to now (UTC). From here on audience and subject
    /// identity are locked.
    pub fn start(&self, experiment: &mut Experiment) -> Result<(), EngineError> {
        ensure_not_archived(experiment, "start")?;
        if !experiment.start_date.is_empty() {
            return Err(EngineError::invalid(format!(
                "experiment {} already started at {}",
                experiment.id, experiment.start_date
            )));
        }

        if experiment.audience.test_share < MIN_TEST_SHARE {
            warn!(
                experiment = %experiment.id,
                share = experiment.audience.test_share,
                "Launching with a cleared test share, applying the 1% floor"
            );
            experiment.audience.test_share = MIN_TEST_SHARE;
        }

        if !experiment.has_overrides() {
            warn!(
                experiment = %experiment.id,
                "Launching without any override fields (observation-only experiment)"
            );
        }

        experiment.start_date = iso_timestamp(self.clock.now());
        experiment.paused = false;

        info!(
            experiment = %experiment.id,
            start_date = %experiment.start_date,
            share = experiment.audience.test_share,
            segment = %experiment.audience.base_segment_id(),
            "Experiment started"
        );
        Ok(())
    }

    /// Pause or resume a launched experiment
    ///
    /// Sets the flag rather than toggling it, so repeated calls are idempotent.
    pub fn set_paused(&self, experiment: &mut Experiment, paused: bool) -> Result<(), EngineError> {
        let action = if paused { "pause" } else { "resume" };
        ensure_not_archived(experiment, action)?;
        if experiment.start_date.is_empty() {
            return Err(EngineError::invalid(format!(
                "cannot {} experiment {}: not started",
                action, experiment.id
            )));
        }

        if experiment.paused != paused {
            info!(experiment = %experiment.id, paused, "Experiment pause state changed");
        }
        experiment.paused = paused;
        Ok(())
    }

    /// Stop an experiment and mark it for permanent removal
    ///
    /// Drafts are flagged `removed`; no history is retained either way.
    pub fn stop_and_delete(&self, experiment: &mut Experiment) -> Result<(), EngineError> {
        ensure_not_archived(experiment, "delete")?;

        experiment.removed = experiment.start_date.is_empty();
        experiment.paused = false;
        experiment.archived_samples.clear();

        info!(
            experiment = %experiment.id,
            was_draft = experiment.removed,
            "Experiment stopped for deletion"
        );
        Ok(())
    }

    /// Stop a launched experiment and archive it with a result
    ///
    /// Freezes the given time series as `archivedSamples`. Archiving is
    /// terminal.
    pub fn stop_and_archive(
        &self,
        experiment: &mut Experiment,
        result: ArchivedResult,
        snapshot: Vec<Sample>,
    ) -> Result<(), EngineError> {
        ensure_not_archived(experiment, "archive")?;
        if experiment.start_date.is_empty() {
            return Err(EngineError::invalid(format!(
                "cannot archive draft experiment {}: delete it instead",
                experiment.id
            )));
        }
        if result == ArchivedResult::Unset {
            return Err(EngineError::validation(
                "archivedResult must be success or failure",
            ));
        }

        experiment.archived = true;
        experiment.archived_result = result;
        experiment.archived_samples = snapshot;
        experiment.paused = false;
        experiment.removed = false;

        info!(
            experiment = %experiment.id,
            result = %result,
            samples = experiment.archived_samples.len(),
            "Experiment archived"
        );
        Ok(())
    }

    /// Correct the recorded result of an archived experiment
    pub fn set_archived_result(
        &self,
        experiment: &mut Experiment,
        result: ArchivedResult,
    ) -> Result<(), EngineError> {
        if !experiment.archived {
            return Err(EngineError::invalid(format!(
                "experiment {} is not archived",
                experiment.id
            )));
        }
        if result == ArchivedResult::Unset {
            return Err(EngineError::validation(
                "archivedResult must be success or failure",
            ));
        }
        experiment.archived_result = result;
        Ok(())
    }

    pub fn set_name(
        &self,
        experiment: &mut Experiment,
        name: impl Into<String>,
    ) -> Result<(), EngineError> {
        ensure_not_archived(experiment, "rename")?;
        experiment.name = name.into();
        Ok(())
    }

    /// Set the codename, keeping only machine-safe characters
    ///
    /// ASCII alphanumerics, '_' and '-' are kept; whitespace becomes '_';
    /// everything else is dropped.
    pub fn set_codename(&self, experiment: &mut Experiment, raw: &str) -> Result<(), EngineError> {
        ensure_not_archived(experiment, "change codename")?;
        let codename = sanitize_codename(raw);
        if codename != raw {
            warn!(
                experiment = %experiment.id,
                raw = %raw,
                codename = %codename,
                "Codename sanitized"
            );
        }
        experiment.codename = codename;
        Ok(())
    }

    pub fn set_comment(
        &self,
        experiment: &mut Experiment,
        comment: impl Into<String>,
    ) -> Result<(), EngineError> {
        ensure_not_archived(experiment, "change comment")?;
        experiment.comment = comment.into();
        Ok(())
    }

    /// Replace the observed metrics
    ///
    /// Metrics outside this edition's allow-list are rejected.
    pub fn set_observed_metrics(
        &self,
        experiment: &mut Experiment,
        metrics: Vec<ObservedMetric>,
    ) -> Result<(), EngineError> {
        ensure_not_archived(experiment, "change observed metrics")?;
        if let Some(metric) = metrics
            .iter()
            .find(|m| !self.features.allows_metric(&m.metric_id))
        {
            return Err(EngineError::invalid(format!(
                "metric '{}' is not available in this edition",
                metric.metric_id
            )));
        }
        experiment.observed_metrics = metrics;
        Ok(())
    }
}

/// Reduce a codename to machine-safe characters
pub fn sanitize_codename(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                Some(c)
            } else if c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .collect()
}
