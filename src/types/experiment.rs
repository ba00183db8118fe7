//! Experiment definition, variants, and audience segmentation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ValidationError;

/// Lifecycle status of an experiment.
///
/// Allowed transitions: `Running ⇄ Paused`, `Running → Completed` (only via
/// winner declaration), `{Running, Paused, Completed} → Archived`. Archived
/// is terminal and rejects all further writes for the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Running,
    Paused,
    Completed,
    Archived,
}

/// One arm of an experiment.
///
/// The config payload is opaque to the engine; it is handed back verbatim
/// to callers of `variant_config` and snapshotted into assignments and
/// rollout records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Unique id within the experiment. Exactly one variant per experiment
    /// carries the id `"control"`.
    pub id: String,
    /// Traffic weight, 0-100. Weights across the experiment sum to 100.
    pub weight: u8,
    /// Opaque config payload interpreted by the calling application.
    #[serde(default)]
    pub config: Value,
}

impl Variant {
    pub fn new(id: impl Into<String>, weight: u8) -> Self {
        Self {
            id: id.into(),
            weight,
            config: Value::Null,
        }
    }

    /// Attach a config payload.
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Whether this is the control arm.
    pub fn is_control(&self) -> bool {
        self.id == CONTROL_VARIANT_ID
    }
}

/// Reserved id of the control arm.
pub const CONTROL_VARIANT_ID: &str = "control";

/// Audience filter evaluated against a [`UserProfile`] at assignment time.
///
/// All set fields must match (AND-combined). Unset fields match everyone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentFilter {
    /// Allowed subscription tiers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiers: Option<Vec<String>>,
    /// Allowed ISO country codes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countries: Option<Vec<String>>,
    /// Maximum account age in whole days since the user's creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_account_age_days: Option<i64>,
}

impl SegmentFilter {
    /// Evaluate the filter against a user profile at `now`.
    pub fn matches(&self, user: &UserProfile, now: DateTime<Utc>) -> bool {
        if let Some(tiers) = &self.tiers {
            if !tiers.iter().any(|t| t == &user.tier) {
                return false;
            }
        }
        if let Some(countries) = &self.countries {
            if !countries.iter().any(|c| c == &user.country) {
                return false;
            }
        }
        if let Some(max_days) = self.max_account_age_days {
            let age_days = (now - user.created_at).num_days();
            if age_days > max_days {
                return false;
            }
        }
        true
    }
}

/// The slice of a user profile the engine needs for segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub tier: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            tier: String::new(),
            country: String::new(),
            created_at,
        }
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = tier.into();
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }
}

/// Experiment draft submitted to `ExperimentEngine::create`.
///
/// Validated synchronously against the invariants documented on
/// [`Experiment`] before anything is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentDraft {
    pub name: String,
    #[serde(default)]
    pub hypothesis: String,
    /// Ordered variant list. Order is load-bearing: it drives both bucket
    /// selection and the decision-engine tie-break.
    pub variants: Vec<Variant>,
    pub primary_metric: String,
    #[serde(default)]
    pub secondary_metrics: Vec<String>,
    pub min_sample_size: u64,
    /// Confidence level for reporting, e.g. 0.95.
    pub confidence_level: f64,
    pub duration_days: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_segments: Option<SegmentFilter>,
    /// Whether a declared winner is rolled out and the experiment
    /// completed automatically.
    #[serde(default)]
    pub auto_rollout: bool,
}

impl ExperimentDraft {
    /// Validate the draft against the experiment invariants.
    ///
    /// Rejects: fewer than 2 variants, weights not summing to exactly 100,
    /// missing or duplicated "control", duplicate variant ids, empty
    /// primary metric, non-positive duration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.variants.len() < 2 {
            return Err(ValidationError::TooFewVariants(self.variants.len()));
        }
        let weight_sum: u32 = self.variants.iter().map(|v| v.weight as u32).sum();
        if weight_sum != 100 {
            return Err(ValidationError::WeightSum(weight_sum));
        }
        let control_count = self.variants.iter().filter(|v| v.is_control()).count();
        if control_count != 1 {
            return Err(ValidationError::ControlCount(control_count));
        }
        for (i, v) in self.variants.iter().enumerate() {
            if self.variants[..i].iter().any(|prev| prev.id == v.id) {
                return Err(ValidationError::DuplicateVariant(v.id.clone()));
            }
        }
        if self.primary_metric.trim().is_empty() {
            return Err(ValidationError::MissingPrimaryMetric);
        }
        if self.duration_days < 1 {
            return Err(ValidationError::InvalidDuration(self.duration_days));
        }
        Ok(())
    }
}

/// A configured experiment with its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub name: String,
    pub hypothesis: String,
    /// Ordered variant list (see [`ExperimentDraft::variants`]).
    pub variants: Vec<Variant>,
    pub primary_metric: String,
    pub secondary_metrics: Vec<String>,
    pub min_sample_size: u64,
    pub confidence_level: f64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub target_segments: Option<SegmentFilter>,
    pub auto_rollout: bool,
    pub status: ExperimentStatus,
    pub winner_variant_id: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Experiment {
    /// Materialize a validated draft into a running experiment.
    pub fn from_draft(draft: ExperimentDraft, id: String, now: DateTime<Utc>) -> Self {
        let end_date = now + Duration::days(draft.duration_days);
        Self {
            id,
            name: draft.name,
            hypothesis: draft.hypothesis,
            variants: draft.variants,
            primary_metric: draft.primary_metric,
            secondary_metrics: draft.secondary_metrics,
            min_sample_size: draft.min_sample_size,
            confidence_level: draft.confidence_level,
            start_date: now,
            end_date,
            target_segments: draft.target_segments,
            auto_rollout: draft.auto_rollout,
            status: ExperimentStatus::Running,
            winner_variant_id: None,
            completed_at: None,
        }
    }

    /// Look up a variant by id.
    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    /// The control arm. Present by construction on validated experiments.
    pub fn control(&self) -> Option<&Variant> {
        self.variants.iter().find(|v| v.is_control())
    }

    /// Whole days elapsed since the experiment started.
    pub fn elapsed_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.start_date).num_days()
    }

    /// Select the variant whose cumulative-weight range contains `bucket`.
    ///
    /// Walks the stored variant order accumulating weights; `bucket` is in
    /// 0..100. Returns `None` only for malformed weight sets (< 100),
    /// which validation excludes.
    pub fn variant_for_bucket(&self, bucket: u8) -> Option<&Variant> {
        let mut cumulative = 0u32;
        for variant in &self.variants {
            cumulative += variant.weight as u32;
            if (bucket as u32) < cumulative {
                return Some(variant);
            }
        }
        None
    }
}
