//! Persistence collaborator for the experimentation engine.
//!
//! The engine never talks to a concrete backend; every component receives
//! an `Arc<dyn ExperimentStore>` at construction. The store owns the two
//! hard concurrency contracts:
//!
//! - assignment insertion is a linearizable insert-if-absent per
//!   `(user_id, test_id)` — concurrent first-time callers converge on one
//!   winning row, losers read it back;
//! - counter updates are atomic adds, so concurrent events for the same
//!   variant never lose updates;
//! - event recording commits the dedupe marker and the counter effects
//!   together, so a failed call can be retried with the same `event_id`.
//!
//! Archived experiments are terminal: the store rejects all further writes
//! for that id.

mod memory;

pub use memory::MemoryStore;

use chrono::{DateTime, Utc};

use crate::errors::StoreError;
use crate::types::{Assignment, Event, Experiment, VariantStats, WinningVariant};

/// Outcome of an insert-if-absent on the assignments table.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentInsert {
    /// This call created the row. The caller owns the one-time side
    /// effects (users counter increment).
    Inserted,
    /// A row already existed; here it is.
    Existing(Assignment),
}

/// Storage contract for experiments, assignments, events, and aggregates.
///
/// Implementations must enforce uniqueness on `(user_id, test_id)` for
/// assignments and `(test_id, variant_id)` for stats rows, and reject all
/// writes against archived experiments with [`StoreError::Archived`].
pub trait ExperimentStore: Send + Sync {
    /// Persist a new experiment together with one zeroed stats row per
    /// variant, as a single commit.
    fn insert_experiment(&self, experiment: Experiment) -> Result<(), StoreError>;

    /// Fetch an experiment by id.
    fn experiment(&self, test_id: &str) -> Result<Option<Experiment>, StoreError>;

    /// Replace a stored experiment (status transitions, winner fields).
    /// Rejected once the stored row is archived.
    fn update_experiment(&self, experiment: &Experiment) -> Result<(), StoreError>;

    /// Fetch an assignment by key.
    fn assignment(&self, user_id: &str, test_id: &str) -> Result<Option<Assignment>, StoreError>;

    /// Linearizable insert-if-absent keyed on `(user_id, test_id)`.
    fn insert_assignment_if_absent(
        &self,
        assignment: Assignment,
    ) -> Result<AssignmentInsert, StoreError>;

    /// Atomically add one distinct user to a variant's stats row.
    fn increment_users(
        &self,
        test_id: &str,
        variant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Append an event and apply its counter effects (conversions and/or
    /// revenue, by kind) to the variant's stats row as a single commit,
    /// deduplicating on `event_id` within the test. Returns `false` (and
    /// changes nothing) when the id was already seen. A failed call leaves
    /// nothing behind, so the same submission can be retried.
    fn record_event(&self, event: Event) -> Result<bool, StoreError>;

    /// Atomically add a conversion (+1 conversions, +amount revenue).
    fn apply_conversion(
        &self,
        test_id: &str,
        variant_id: &str,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Atomically add revenue only.
    fn apply_revenue(
        &self,
        test_id: &str,
        variant_id: &str,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Point-in-time snapshot of all stats rows for a test, in the
    /// experiment's stored variant order. Must not block writers.
    fn variant_stats(&self, test_id: &str) -> Result<Vec<VariantStats>, StoreError>;

    /// Append a rollout record. Append-only, never mutated.
    fn push_winning_variant(&self, winner: WinningVariant) -> Result<(), StoreError>;

    /// Rollout history for a test, oldest first.
    fn winning_variants(&self, test_id: &str) -> Result<Vec<WinningVariant>, StoreError>;
}
