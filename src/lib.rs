#![deny(unreachable_pub)]

//! Deterministic A/B experimentation engine.
//!
//! Provides the full test lifecycle: deterministic user-to-variant
//! assignment, conversion/revenue event aggregation, two-proportion
//! significance testing, and a multi-gate winner-decision policy with
//! optional automatic rollout.
//!
//! ## Usage
//!
//! ```ignore
//! let store = Arc::new(MemoryStore::new());
//! let engine = ExperimentEngine::new(store, Arc::new(NoopNotifier));
//!
//! let experiment = engine.create(draft, Utc::now())?;
//!
//! // Per request: branch on the user's assigned config
//! if let Some(assigned) = engine.variant_config(&user, &experiment.id, Utc::now())? {
//!     render(assigned.config);
//! }
//!
//! // On outcome
//! engine.track(EventSubmission::conversion(event_id, &experiment.id, &user.user_id), Utc::now())?;
//!
//! // Periodically
//! engine.check_for_winner(&experiment.id, Utc::now()).await?;
//! ```

mod engine;
mod errors;
pub mod logging;
mod store;
pub mod types;

// Re-exports
pub use engine::{
    bucket_for, two_proportion_z, AssignmentEngine, DecisionEngine, EngineConfig, EventTracker,
    ExperimentEngine, NoopNotifier, SampleCounts, WinnerNotifier, MIN_RELATIVE_LIFT_PCT,
    MIN_TEST_DAYS, SIGNIFICANCE_ALPHA, VERY_LOW_RISK_CONFIDENCE,
};
pub use errors::{Error, NotifyError, Result, StoreError, ValidationError};
pub use store::{AssignmentInsert, ExperimentStore, MemoryStore};
pub use types::*;
