//! Outcome events recorded against assignments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of outcome event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Counts toward conversions; also adds its amount to revenue.
    Conversion,
    /// Adds its amount to revenue only.
    Revenue,
}

/// A client submission to the event tracker.
///
/// `event_id` is a required client-side idempotency key: retried
/// submissions with the same id are dropped instead of double-counting
/// conversions and revenue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSubmission {
    pub event_id: String,
    pub test_id: String,
    pub user_id: String,
    pub kind: EventKind,
    /// Monetary amount; defaults to 0 when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// Free-form payload stored alongside the event.
    #[serde(default)]
    pub data: Value,
}

impl EventSubmission {
    pub fn conversion(
        event_id: impl Into<String>,
        test_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            test_id: test_id.into(),
            user_id: user_id.into(),
            kind: EventKind::Conversion,
            amount: None,
            data: Value::Null,
        }
    }

    pub fn revenue(
        event_id: impl Into<String>,
        test_id: impl Into<String>,
        user_id: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            test_id: test_id.into(),
            user_id: user_id.into(),
            kind: EventKind::Revenue,
            amount: Some(amount),
            data: Value::Null,
        }
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// A persisted event row (append-only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub test_id: String,
    pub user_id: String,
    pub variant_id: String,
    pub kind: EventKind,
    pub amount: Option<f64>,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Build the persisted row for a submission resolved to a variant.
    pub fn from_submission(
        submission: EventSubmission,
        variant_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: submission.event_id,
            test_id: submission.test_id,
            user_id: submission.user_id,
            variant_id: variant_id.into(),
            kind: submission.kind,
            amount: submission.amount,
            data: submission.data,
            created_at,
        }
    }
}

/// Outcome of a tracking call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracked {
    /// Counters updated.
    Recorded,
    /// User has no assignment for this test; nothing recorded.
    NotEnrolled,
    /// Event id already seen for this test; nothing recorded.
    Duplicate,
}
