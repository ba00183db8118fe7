//! Core experimentation components.
//!
//! - `assignment`: deterministic bucket hashing and variant selection
//! - `tracker`: conversion/revenue event recording with dedupe
//! - `significance`: two-proportion Z-test
//! - `decision`: multi-gate winner determination
//! - `lifecycle`: experiment state machine, winner checks, rollout

mod assignment;
mod decision;
mod lifecycle;
mod significance;
mod tracker;

#[cfg(test)]
mod integration_tests;

pub use assignment::{bucket_for, AssignmentEngine};
pub use decision::{
    DecisionEngine, MIN_RELATIVE_LIFT_PCT, MIN_TEST_DAYS, VERY_LOW_RISK_CONFIDENCE,
};
pub use lifecycle::{EngineConfig, ExperimentEngine, NoopNotifier, WinnerNotifier};
pub use significance::{two_proportion_z, SampleCounts, SIGNIFICANCE_ALPHA};
pub use tracker::EventTracker;
