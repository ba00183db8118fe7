//! Aggregated counters, significance results, and decision output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Aggregated per-variant counters, one row per `(test_id, variant_id)`.
///
/// Created zeroed at experiment creation and updated atomically by the
/// assignment engine (`users`) and event tracker (`conversions`,
/// `revenue`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantStats {
    pub test_id: String,
    pub variant_id: String,
    /// Distinct users assigned to this variant.
    pub users: u64,
    pub conversions: u64,
    /// Summed revenue across conversion and revenue events.
    pub revenue: f64,
    pub updated_at: DateTime<Utc>,
}

impl VariantStats {
    /// A zeroed row for a freshly created experiment.
    pub fn zeroed(
        test_id: impl Into<String>,
        variant_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            test_id: test_id.into(),
            variant_id: variant_id.into(),
            users: 0,
            conversions: 0,
            revenue: 0.0,
            updated_at: now,
        }
    }

    /// Conversion rate, 0 when no users yet.
    pub fn conversion_rate(&self) -> f64 {
        if self.users == 0 {
            0.0
        } else {
            self.conversions as f64 / self.users as f64
        }
    }
}

/// Result of a two-proportion Z-test between control and one variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Significance {
    /// Z statistic; positive means the variant converts better.
    pub z: f64,
    /// Two-tailed p-value.
    pub p_value: f64,
    /// `p_value < 0.05`.
    pub significant: bool,
    /// `(1 - p_value) * 100`, rounded to 2 decimals.
    pub confidence: f64,
}

impl Significance {
    /// Neutral result for degenerate inputs (zero samples / zero SE).
    pub fn inconclusive() -> Self {
        Self {
            z: 0.0,
            p_value: 1.0,
            significant: false,
            confidence: 0.0,
        }
    }
}

/// Per-variant slice of a test-results report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantResult {
    pub variant_id: String,
    pub users: u64,
    pub conversions: u64,
    pub revenue: f64,
    pub conversion_rate: f64,
    /// Significance vs control; `None` for the control arm itself.
    pub significance: Option<Significance>,
}

/// Risk classification attached to a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "very low")]
    VeryLow,
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "high")]
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::VeryLow => "very low",
            RiskLevel::Low => "low",
            RiskLevel::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision-engine recommendation. Each gate produces a distinct string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// No significant candidate, or no non-control variants.
    InsufficientData,
    /// Sample-size gate failed.
    NeedMoreUsers,
    /// Duration gate failed (hard 7-day minimum).
    NeedMoreTime,
    /// Effect-size gate failed (< 10% relative lift).
    NoMeaningfulImprovement,
    /// All gates passed.
    RollOutWinner,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::InsufficientData => "Insufficient data",
            Recommendation::NeedMoreUsers => "Continue test - need more users",
            Recommendation::NeedMoreTime => "Continue test - need more time",
            Recommendation::NoMeaningfulImprovement => {
                "No significant improvement found - consider new variants"
            }
            Recommendation::RollOutWinner => "ROLL OUT WINNER IMMEDIATELY",
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Revenue projection computed on winner declaration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RevenueImpact {
    /// Winner revenue minus control revenue over the test so far.
    pub revenue_increase: f64,
    /// `revenue_increase / elapsed_days * 30`.
    pub projected_monthly: f64,
    /// `projected_monthly * 12`.
    pub projected_annual: f64,
}

/// Output of the decision engine for one experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    /// Declared winner variant id, if all gates passed.
    pub winner: Option<String>,
    /// Relative conversion-rate lift of the best candidate over control,
    /// in percent.
    pub improvement: f64,
    /// Present only when a winner is declared.
    pub revenue_impact: Option<RevenueImpact>,
    pub recommendation: Recommendation,
    pub risk_level: RiskLevel,
}

/// Full test-results report returned to consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResults {
    pub test_id: String,
    pub results: Vec<VariantResult>,
    pub analysis: Analysis,
}

/// Append-only record of a rollout decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinningVariant {
    pub test_id: String,
    pub variant_id: String,
    /// Variant config snapshot at decision time.
    pub config: Value,
    pub rolled_out_at: DateTime<Utc>,
}

/// Summary handed to the notifier collaborator on winner declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinnerSummary {
    pub test_id: String,
    pub test_name: String,
    pub winner_variant_id: String,
    pub improvement: f64,
    pub confidence: f64,
    pub revenue_impact: Option<RevenueImpact>,
    pub auto_rolled_out: bool,
}
