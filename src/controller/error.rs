use crate::controller::persistence::BackendError;
use thiserror::Error;

/// Errors surfaced by the lifecycle controller and the experiment store
#[derive(Debug, Error)]
pub enum EngineError {
    /// Mutation disallowed by the experiment's lifecycle state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Input that cannot be clamped into a legal value
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Backing store call failed or reported success=false
    #[error("Persistence failed: {0}")]
    Persistence(#[from] BackendError),

    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    #[error("ChangeSet index {index} out of range ({len} change sets)")]
    ChangeSetOutOfRange { index: usize, len: usize },
}

impl EngineError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        EngineError::InvalidOperation(message.into())
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }
}
