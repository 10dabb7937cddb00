//! Persisted experiment types
//!
//! These types are the wire format exchanged with the persistence service.
//! Field names follow the service's camelCase JSON contract.

pub mod change_set;
pub mod experiment;

pub use change_set::{
    generate_change_set_id, ChangeSet, ContentItem, OfferField, Overrides, SubjectType,
    MAX_CONTENT_AMOUNT, MIN_CONTENT_AMOUNT,
};
pub use experiment::{
    parse_synthetic_segment_id, synthetic_segment_id, ArchivedResult, Audience, Experiment,
    ExperimentState, MetricExpectation, ObservedMetric, Sample, DEFAULT_TEST_SHARE,
    EVERYONE_SEGMENT, MAX_TEST_SHARE, MIN_TEST_SHARE, SYNTHETIC_SEGMENT_PREFIX,
};

#[cfg(test)]
#[path = "experiment_test.rs"]
mod tests;
