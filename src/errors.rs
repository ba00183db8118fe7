use thiserror::Error;

use crate::types::ExperimentStatus;

/// Experiment configuration validation errors.
///
/// All of these are rejected synchronously at create time, before any
/// persistence happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Experiment needs at least 2 variants (got {0})")]
    TooFewVariants(usize),
    #[error("Variant weights must sum to exactly 100 (got {0})")]
    WeightSum(u32),
    #[error("Exactly one variant must have id \"control\" (got {0})")]
    ControlCount(usize),
    #[error("Duplicate variant id: {0}")]
    DuplicateVariant(String),
    #[error("Primary metric must be non-empty")]
    MissingPrimaryMetric,
    #[error("Duration must be at least 1 day (got {0})")]
    InvalidDuration(i64),
}

/// Persistence collaborator errors.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Backend temporarily unreachable. Retryable; surfaced to the caller,
    /// never swallowed.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    /// Referenced experiment does not exist.
    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),
    /// Referenced variant does not exist within the experiment.
    #[error("Variant {variant_id} not found in experiment {test_id}")]
    VariantNotFound { test_id: String, variant_id: String },
    /// Write against an archived experiment. Archived is terminal.
    #[error("Experiment {0} is archived and rejects writes")]
    Archived(String),
    /// Corrupt or unparseable persisted payload.
    #[error("Corrupt stored data: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether the caller may retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Winner notification errors. Delivery is best-effort: failures are
/// logged by the lifecycle controller, never propagated.
#[derive(Error, Debug, Clone)]
pub enum NotifyError {
    #[error("Notifier delivery failed: {0}")]
    Delivery(String),
    #[error("Notifier timed out after {0}ms")]
    Timeout(u64),
}

/// Main engine error type.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Invalid experiment configuration at create time.
    #[error("Invalid experiment config: {0}")]
    Validation(#[from] ValidationError),

    /// Persistence failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Status transition not allowed by the lifecycle state machine.
    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: ExperimentStatus,
        to: ExperimentStatus,
    },
}

impl Error {
    /// Create a retryable store-unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Error::Store(StoreError::Unavailable(msg.into()))
    }

    /// Whether the operation may be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Store(e) if e.is_retryable())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
