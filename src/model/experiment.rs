use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::change_set::ChangeSet;

/// Reserved base segment meaning the whole player base
pub const EVERYONE_SEGMENT: &str = "everyone";

/// Prefix of the synthetic segment addressing an experiment's test arm
///
/// Segmentation and player-composition dashboards parse this prefix to
/// recognize A/B-test-derived audiences, so it must never change.
pub const SYNTHETIC_SEGMENT_PREFIX: &str = "abtest_";

/// Test share assigned to newly created experiments (10%)
pub const DEFAULT_TEST_SHARE: f64 = 0.10;

/// Smallest test share a configured experiment may carry (1%)
pub const MIN_TEST_SHARE: f64 = 0.01;

/// Largest test share (the whole base segment)
pub const MAX_TEST_SHARE: f64 = 1.0;

/// Build the synthetic segment id for an experiment's test arm
pub fn synthetic_segment_id(experiment_id: &str) -> String {
    format!("{}{}", SYNTHETIC_SEGMENT_PREFIX, experiment_id)
}

/// Extract the experiment id from a synthetic segment id
///
/// Returns None for ordinary segments and for a bare prefix.
pub fn parse_synthetic_segment_id(segment_id: &str) -> Option<&str> {
    segment_id
        .strip_prefix(SYNTHETIC_SEGMENT_PREFIX)
        .filter(|id| !id.is_empty())
}

/// Experiment is the aggregate root of one A/B test
///
/// Carries identity, the audience split, observed metrics, the ordered
/// ChangeSets describing the test arm, and the lifecycle flags.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct Experiment {
    /// Opaque identifier generated at creation, never reused
    pub id: String,

    /// Machine-safe identifier, independently editable
    #[serde(default)]
    pub codename: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub comment: String,

    pub audience: Audience,

    /// Metrics to observe, in display order
    #[serde(rename = "observedMetrics", default)]
    pub observed_metrics: Vec<ObservedMetric>,

    /// Things under test; never empty
    #[serde(rename = "changeSets", default)]
    pub change_sets: Vec<ChangeSet>,

    /// Informational sample size recorded at creation
    #[serde(rename = "sampleSize", default)]
    pub sample_size: u64,

    /// ISO-8601 UTC launch timestamp, empty while the experiment is a Draft
    #[serde(rename = "startDate", default)]
    pub start_date: String,

    #[serde(default)]
    pub paused: bool,

    /// Set only on hard-deleted Drafts
    #[serde(default)]
    pub removed: bool,

    /// Terminal marker
    #[serde(default)]
    pub archived: bool,

    #[serde(rename = "archivedResult", default)]
    pub archived_result: ArchivedResult,

    /// Time series frozen at archive time, for historical display
    #[serde(
        rename = "archivedSamples",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub archived_samples: Vec<Sample>,
}

impl Experiment {
    /// Derive the lifecycle state from the persisted flags
    pub fn state(&self) -> ExperimentState {
        if self.archived {
            ExperimentState::Archived
        } else if self.start_date.is_empty() {
            ExperimentState::Draft
        } else if self.paused {
            ExperimentState::Paused
        } else {
            ExperimentState::Running
        }
    }

    pub fn is_draft(&self) -> bool {
        self.start_date.is_empty()
    }

    /// Synthetic segment id of this experiment's test arm
    pub fn test_segment_id(&self) -> String {
        synthetic_segment_id(&self.id)
    }

    /// Look up a ChangeSet by its id
    pub fn change_set(&self, change_set_id: &str) -> Option<&ChangeSet> {
        self.change_sets.iter().find(|cs| cs.id == change_set_id)
    }

    /// Position of a ChangeSet in the ordered list
    pub fn change_set_index(&self, change_set_id: &str) -> Option<usize> {
        self.change_sets.iter().position(|cs| cs.id == change_set_id)
    }

    /// Whether any ChangeSet overrides at least one field
    pub fn has_overrides(&self) -> bool {
        self.change_sets.iter().any(|cs| !cs.overrides.is_empty())
    }
}

/// Audience split of an experiment
///
/// The experiment carves `testShare` of one base segment into the test arm;
/// the remainder is the implicit control. Both persisted references name the
/// same base segment.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct Audience {
    /// Control arm reference (the base segment)
    pub control: String,

    /// Test arm reference; always equal to `control`
    pub test: String,

    /// Fraction of the base segment routed to the test arm
    #[serde(rename = "testShare")]
    pub test_share: f64,
}

impl Audience {
    pub fn new(base_segment_id: impl Into<String>, test_share: f64) -> Self {
        let base = base_segment_id.into();
        Audience {
            control: base.clone(),
            test: base,
            test_share,
        }
    }

    pub fn base_segment_id(&self) -> &str {
        &self.control
    }
}

impl Default for Audience {
    fn default() -> Self {
        Audience::new(EVERYONE_SEGMENT, DEFAULT_TEST_SHARE)
    }
}

/// A metric the experiment observes
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct ObservedMetric {
    #[serde(rename = "metricID")]
    pub metric_id: String,

    pub expectation: MetricExpectation,
}

/// Expected direction of an observed metric in the test arm
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum MetricExpectation {
    #[default]
    #[serde(rename = "increase")]
    Increase,
    #[serde(rename = "decrease")]
    Decrease,
}

/// Outcome recorded when an experiment is archived
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum ArchivedResult {
    /// Not archived yet
    #[default]
    #[serde(rename = "")]
    Unset,
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "failure")]
    Failure,
}

impl fmt::Display for ArchivedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ArchivedResult::Unset => "",
            ArchivedResult::Success => "success",
            ArchivedResult::Failure => "failure",
        };
        f.write_str(label)
    }
}

/// One point of the control-vs-test time series
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct Sample {
    pub timestamp: String,

    #[serde(rename = "controlValue")]
    pub control_value: f64,

    #[serde(rename = "testValue")]
    pub test_value: f64,
}

/// Lifecycle state derived from an experiment's flags
///
/// Deleted experiments leave the collection, so they have no state here.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ExperimentState {
    /// Not launched; every field mutable
    Draft,
    /// Launched and collecting data
    Running,
    /// Launched but paused
    Paused,
    /// Concluded with a recorded result; terminal
    Archived,
}

impl fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExperimentState::Draft => "Draft",
            ExperimentState::Running => "Running",
            ExperimentState::Paused => "Paused",
            ExperimentState::Archived => "Archived",
        };
        f.write_str(label)
    }
}
