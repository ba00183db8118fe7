//! Typed data model for the experimentation engine.
//!
//! Everything the engine persists or reports is a typed value here; JSON
//! marshalling happens only at the storage boundary.

mod assignment;
mod event;
mod experiment;
mod stats;

pub use assignment::{AssignedVariant, Assignment};
pub use event::{Event, EventKind, EventSubmission, Tracked};
pub use experiment::{
    Experiment, ExperimentDraft, ExperimentStatus, SegmentFilter, UserProfile, Variant,
    CONTROL_VARIANT_ID,
};
pub use stats::{
    Analysis, Recommendation, RevenueImpact, RiskLevel, Significance, TestResults, VariantResult,
    VariantStats, WinnerSummary, WinningVariant,
};
