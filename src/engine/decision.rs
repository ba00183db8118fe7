//! Winner determination policy.
//!
//! A variant becomes the winner only after passing every gate, in fixed
//! priority order: statistical significance, sample size, minimum test
//! duration, and minimum effect size. Each failed gate produces its own
//! recommendation so operators can see exactly what is still missing.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::logging::targets;
use crate::types::{
    Analysis, Experiment, Recommendation, RevenueImpact, RiskLevel, VariantResult,
};

/// Hard minimum test duration in days, independent of the configured
/// experiment duration.
pub const MIN_TEST_DAYS: i64 = 7;

/// Minimum relative conversion-rate lift over control, in percent.
pub const MIN_RELATIVE_LIFT_PCT: f64 = 10.0;

/// Confidence at or above which a rollout is classified "very low" risk.
pub const VERY_LOW_RISK_CONFIDENCE: f64 = 95.0;

/// Applies the winner-gating policy over per-variant results.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecisionEngine;

impl DecisionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Analyze a point-in-time results snapshot.
    ///
    /// The candidate is the significant non-control variant with the
    /// greatest relative lift over control; ties resolve to the earliest
    /// variant in the experiment's stored order, so reruns over the same
    /// snapshot are reproducible.
    pub fn analyze(
        &self,
        experiment: &Experiment,
        results: &[VariantResult],
        now: DateTime<Utc>,
    ) -> Analysis {
        let control = results.iter().find(|r| {
            experiment
                .variant(&r.variant_id)
                .is_some_and(|v| v.is_control())
        });

        let candidate = control.and_then(|control| {
            results
                .iter()
                .filter(|r| r.variant_id != control.variant_id)
                .filter(|r| r.significance.is_some_and(|s| s.significant))
                .map(|r| (r, relative_lift_pct(control.conversion_rate, r.conversion_rate)))
                // Strict > keeps the first-encountered variant on ties.
                .fold(None, |best: Option<(&VariantResult, f64)>, (r, lift)| {
                    match best {
                        Some((_, best_lift)) if lift <= best_lift => best,
                        _ => Some((r, lift)),
                    }
                })
        });

        let (Some(control), Some((winner, improvement))) = (control, candidate) else {
            // No significant candidate (or no non-control arms at all):
            // numeric gates are not evaluated.
            return Analysis {
                winner: None,
                improvement: 0.0,
                revenue_impact: None,
                recommendation: Recommendation::InsufficientData,
                risk_level: RiskLevel::High,
            };
        };

        let max_users = results.iter().map(|r| r.users).max().unwrap_or(0);
        if max_users < experiment.min_sample_size {
            debug!(
                target: targets::DECISION,
                test_id = %experiment.id,
                max_users,
                min_sample_size = experiment.min_sample_size,
                "sample-size gate failed"
            );
            return Analysis {
                winner: None,
                improvement,
                revenue_impact: None,
                recommendation: Recommendation::NeedMoreUsers,
                risk_level: RiskLevel::High,
            };
        }

        let elapsed_days = experiment.elapsed_days(now);
        if elapsed_days < MIN_TEST_DAYS {
            debug!(
                target: targets::DECISION,
                test_id = %experiment.id,
                elapsed_days,
                "duration gate failed"
            );
            return Analysis {
                winner: None,
                improvement,
                revenue_impact: None,
                recommendation: Recommendation::NeedMoreTime,
                risk_level: RiskLevel::High,
            };
        }

        if improvement < MIN_RELATIVE_LIFT_PCT {
            return Analysis {
                winner: None,
                improvement,
                revenue_impact: None,
                recommendation: Recommendation::NoMeaningfulImprovement,
                risk_level: RiskLevel::High,
            };
        }

        let revenue_increase = winner.revenue - control.revenue;
        let projected_monthly = revenue_increase / elapsed_days as f64 * 30.0;
        let revenue_impact = RevenueImpact {
            revenue_increase,
            projected_monthly,
            projected_annual: projected_monthly * 12.0,
        };

        let confidence = winner.significance.map(|s| s.confidence).unwrap_or(0.0);
        let risk_level = if confidence >= VERY_LOW_RISK_CONFIDENCE {
            RiskLevel::VeryLow
        } else {
            RiskLevel::Low
        };

        Analysis {
            winner: Some(winner.variant_id.clone()),
            improvement,
            revenue_impact: Some(revenue_impact),
            recommendation: Recommendation::RollOutWinner,
            risk_level,
        }
    }
}

/// Relative conversion-rate lift of a variant over control, in percent.
/// A zero-rate control yields zero lift (no division).
fn relative_lift_pct(control_rate: f64, variant_rate: f64) -> f64 {
    if control_rate <= 0.0 {
        0.0
    } else {
        (variant_rate - control_rate) / control_rate * 100.0
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::types::{ExperimentDraft, Significance, Variant};

    fn experiment(min_sample_size: u64, started_days_ago: i64) -> Experiment {
        let draft = ExperimentDraft {
            name: "checkout_flow".to_string(),
            hypothesis: String::new(),
            variants: vec![
                Variant::new("control", 40),
                Variant::new("v1", 30),
                Variant::new("v2", 30),
            ],
            primary_metric: "conversion".to_string(),
            secondary_metrics: vec![],
            min_sample_size,
            confidence_level: 0.95,
            duration_days: 14,
            target_segments: None,
            auto_rollout: false,
        };
        let start = Utc::now() - Duration::days(started_days_ago);
        Experiment::from_draft(draft, "t1".to_string(), start)
    }

    fn result(
        variant_id: &str,
        users: u64,
        conversions: u64,
        revenue: f64,
        significance: Option<Significance>,
    ) -> VariantResult {
        VariantResult {
            variant_id: variant_id.to_string(),
            users,
            conversions,
            revenue,
            conversion_rate: if users == 0 {
                0.0
            } else {
                conversions as f64 / users as f64
            },
            significance,
        }
    }

    fn significant(confidence: f64) -> Option<Significance> {
        Some(Significance {
            z: 4.0,
            p_value: 1.0 - confidence / 100.0,
            significant: true,
            confidence,
        })
    }

    fn not_significant() -> Option<Significance> {
        Some(Significance {
            z: 0.5,
            p_value: 0.6,
            significant: false,
            confidence: 40.0,
        })
    }

    #[test]
    fn test_winner_declared_when_all_gates_pass() {
        let exp = experiment(1000, 10);
        let now = Utc::now();
        let results = vec![
            result("control", 2000, 200, 1000.0, None),
            result("v1", 2000, 300, 1800.0, significant(99.9)),
        ];

        let analysis = DecisionEngine::new().analyze(&exp, &results, now);
        assert_eq!(analysis.winner.as_deref(), Some("v1"));
        assert_eq!(analysis.recommendation, Recommendation::RollOutWinner);
        assert_eq!(analysis.risk_level, RiskLevel::VeryLow);
        assert!((analysis.improvement - 50.0).abs() < 1e-9);

        let impact = analysis.revenue_impact.unwrap();
        assert!((impact.revenue_increase - 800.0).abs() < 1e-9);
        assert!((impact.projected_monthly - 800.0 / 10.0 * 30.0).abs() < 1e-9);
        assert!((impact.projected_annual - impact.projected_monthly * 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_size_gate_blocks_even_strong_winner() {
        let exp = experiment(10_000, 30);
        let results = vec![
            result("control", 2000, 200, 0.0, None),
            result("v1", 2000, 300, 0.0, significant(99.9)),
        ];

        let analysis = DecisionEngine::new().analyze(&exp, &results, Utc::now());
        assert_eq!(analysis.winner, None);
        assert_eq!(analysis.recommendation, Recommendation::NeedMoreUsers);
        // The improvement itself is still reported.
        assert!((analysis.improvement - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_duration_gate_blocks_young_test() {
        let exp = experiment(1000, 3);
        let results = vec![
            result("control", 2000, 200, 0.0, None),
            result("v1", 2000, 300, 0.0, significant(99.9)),
        ];

        let analysis = DecisionEngine::new().analyze(&exp, &results, Utc::now());
        assert_eq!(analysis.winner, None);
        assert_eq!(analysis.recommendation, Recommendation::NeedMoreTime);
    }

    #[test]
    fn test_effect_size_gate_blocks_small_lift() {
        let exp = experiment(1000, 10);
        // 5% relative lift, significant but too small to act on.
        let results = vec![
            result("control", 20_000, 2000, 0.0, None),
            result("v1", 20_000, 2100, 0.0, significant(96.0)),
        ];

        let analysis = DecisionEngine::new().analyze(&exp, &results, Utc::now());
        assert_eq!(analysis.winner, None);
        assert_eq!(
            analysis.recommendation,
            Recommendation::NoMeaningfulImprovement
        );
    }

    #[test]
    fn test_no_significant_candidate_short_circuits_gates() {
        // min_sample_size deliberately unmet: gates must not even be
        // evaluated, the recommendation is InsufficientData regardless.
        let exp = experiment(1_000_000, 1);
        let results = vec![
            result("control", 100, 10, 0.0, None),
            result("v1", 100, 12, 0.0, not_significant()),
        ];

        let analysis = DecisionEngine::new().analyze(&exp, &results, Utc::now());
        assert_eq!(analysis.winner, None);
        assert_eq!(analysis.recommendation, Recommendation::InsufficientData);
        assert_eq!(analysis.risk_level, RiskLevel::High);
        assert_eq!(analysis.improvement, 0.0);
    }

    #[test]
    fn test_control_only_results_are_insufficient() {
        let exp = experiment(100, 30);
        let results = vec![result("control", 5000, 500, 0.0, None)];

        let analysis = DecisionEngine::new().analyze(&exp, &results, Utc::now());
        assert_eq!(analysis.recommendation, Recommendation::InsufficientData);
    }

    #[test]
    fn test_tie_breaks_to_stored_variant_order() {
        let exp = experiment(100, 10);
        // v1 and v2 have identical lift; v1 comes first in stored order.
        let results = vec![
            result("control", 2000, 200, 0.0, None),
            result("v1", 2000, 300, 0.0, significant(99.0)),
            result("v2", 2000, 300, 0.0, significant(99.5)),
        ];

        let analysis = DecisionEngine::new().analyze(&exp, &results, Utc::now());
        assert_eq!(analysis.winner.as_deref(), Some("v1"));
    }

    #[test]
    fn test_best_lift_wins_among_significant() {
        let exp = experiment(100, 10);
        let results = vec![
            result("control", 2000, 200, 0.0, None),
            result("v1", 2000, 260, 0.0, significant(99.0)),
            result("v2", 2000, 300, 0.0, significant(97.0)),
        ];

        let analysis = DecisionEngine::new().analyze(&exp, &results, Utc::now());
        assert_eq!(analysis.winner.as_deref(), Some("v2"));
    }

    #[test]
    fn test_zero_rate_control_yields_zero_lift() {
        let exp = experiment(100, 10);
        let results = vec![
            result("control", 2000, 0, 0.0, None),
            result("v1", 2000, 300, 0.0, significant(99.9)),
        ];

        let analysis = DecisionEngine::new().analyze(&exp, &results, Utc::now());
        // Defined as zero lift, which fails the effect-size gate.
        assert_eq!(analysis.winner, None);
        assert_eq!(
            analysis.recommendation,
            Recommendation::NoMeaningfulImprovement
        );
    }

    #[test]
    fn test_low_confidence_winner_is_low_risk() {
        let exp = experiment(100, 10);
        let results = vec![
            result("control", 2000, 200, 100.0, None),
            result("v1", 2000, 300, 150.0, significant(94.9)),
        ];

        let analysis = DecisionEngine::new().analyze(&exp, &results, Utc::now());
        assert_eq!(analysis.winner.as_deref(), Some("v1"));
        assert_eq!(analysis.risk_level, RiskLevel::Low);
    }
}
