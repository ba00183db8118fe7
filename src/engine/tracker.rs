//! Conversion and revenue event tracking.
//!
//! Every event is recorded against the user's persisted assignment;
//! users without one are silently skipped (they are simply not in the
//! experiment). Submissions carry a client idempotency key so retries
//! never double-count conversions or revenue.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::errors::Result;
use crate::logging::targets;
use crate::store::ExperimentStore;
use crate::types::{Event, EventSubmission, Tracked};

/// Records outcome events and updates aggregate counters.
pub struct EventTracker {
    store: Arc<dyn ExperimentStore>,
}

impl EventTracker {
    pub fn new(store: Arc<dyn ExperimentStore>) -> Self {
        Self { store }
    }

    /// Record one event submission.
    ///
    /// - No assignment for `(user_id, test_id)`: no-op, `NotEnrolled`.
    /// - `event_id` already seen for the test: no-op, `Duplicate`.
    /// - `Conversion`: conversions += 1, revenue += amount (default 0).
    /// - `Revenue`: revenue += amount only.
    ///
    /// The dedupe marker and the counter effects are one store commit, so
    /// a submission that errored (store unavailable, archived experiment)
    /// left nothing behind and can be retried with the same `event_id`.
    pub fn track(&self, submission: EventSubmission, now: DateTime<Utc>) -> Result<Tracked> {
        let Some(assignment) = self
            .store
            .assignment(&submission.user_id, &submission.test_id)?
        else {
            debug!(
                target: targets::TRACKER,
                user_id = %submission.user_id,
                test_id = %submission.test_id,
                "event for unenrolled user dropped"
            );
            return Ok(Tracked::NotEnrolled);
        };

        let test_id = submission.test_id.clone();
        let variant_id = assignment.variant_id.clone();
        let kind = submission.kind;
        let amount = submission.amount.unwrap_or(0.0);
        let event_id = submission.event_id.clone();

        let event = Event::from_submission(submission, &variant_id, now);
        if !self.store.record_event(event)? {
            debug!(
                target: targets::TRACKER,
                test_id = %test_id,
                event_id = %event_id,
                "duplicate event dropped"
            );
            return Ok(Tracked::Duplicate);
        }

        debug!(
            target: targets::TRACKER,
            test_id = %test_id,
            variant_id = %variant_id,
            ?kind,
            amount,
            "event recorded"
        );
        Ok(Tracked::Recorded)
    }
}
