//! Durable user-to-variant assignments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The durable mapping of a user to a variant for one experiment.
///
/// Unique per `(user_id, test_id)` and immutable once written. The config
/// payload is a snapshot of the variant config at assignment time, so
/// later edits to the experiment never change what an assigned user sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub user_id: String,
    pub test_id: String,
    pub variant_id: String,
    /// Variant config snapshot taken when the assignment was created.
    pub config: Value,
    pub created_at: DateTime<Utc>,
}

impl Assignment {
    pub fn new(
        user_id: impl Into<String>,
        test_id: impl Into<String>,
        variant_id: impl Into<String>,
        config: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            test_id: test_id.into(),
            variant_id: variant_id.into(),
            config,
            created_at,
        }
    }
}

/// What a caller of `assign` gets back: the variant id plus the config
/// snapshot to branch runtime behavior on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedVariant {
    pub variant_id: String,
    pub config: Value,
}

impl From<&Assignment> for AssignedVariant {
    fn from(a: &Assignment) -> Self {
        Self {
            variant_id: a.variant_id.clone(),
            config: a.config.clone(),
        }
    }
}
