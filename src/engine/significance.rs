//! Two-proportion Z-test for conversion rates.
//!
//! Compares the conversion rate of a variant against control using the
//! pooled two-proportion Z statistic and a two-tailed p-value. The normal
//! CDF uses the Abramowitz & Stegun rational erf approximation (max error
//! ~1.5e-7, well inside the ~1e-6 accuracy the decision policy needs).
//!
//! All degenerate inputs (empty groups, zero standard error) return a
//! neutral, non-significant result instead of dividing by zero.

use crate::types::{Significance, VariantStats};

/// Sample counts for one arm of the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleCounts {
    /// Distinct users in the arm.
    pub users: u64,
    /// Converted users.
    pub conversions: u64,
}

impl SampleCounts {
    pub fn new(users: u64, conversions: u64) -> Self {
        Self { users, conversions }
    }
}

impl From<&VariantStats> for SampleCounts {
    fn from(stats: &VariantStats) -> Self {
        Self {
            users: stats.users,
            conversions: stats.conversions,
        }
    }
}

/// Significance threshold on the two-tailed p-value.
pub const SIGNIFICANCE_ALPHA: f64 = 0.05;

/// Two-proportion Z-test of `variant` against `control`.
///
/// Positive `z` means the variant converts better than control. Returns
/// [`Significance::inconclusive`] when either arm is empty or the pooled
/// standard error collapses to zero.
pub fn two_proportion_z(control: SampleCounts, variant: SampleCounts) -> Significance {
    if control.users == 0 || variant.users == 0 {
        return Significance::inconclusive();
    }

    let n1 = control.users as f64;
    let x1 = control.conversions as f64;
    let n2 = variant.users as f64;
    let x2 = variant.conversions as f64;

    let p1 = x1 / n1;
    let p2 = x2 / n2;
    let pooled = (x1 + x2) / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();

    if se == 0.0 || !se.is_finite() {
        return Significance::inconclusive();
    }

    let z = (p2 - p1) / se;
    let p_value = (2.0 * (1.0 - normal_cdf(z.abs()))).clamp(0.0, 1.0);
    let significant = p_value < SIGNIFICANCE_ALPHA;
    let confidence = round2((1.0 - p_value) * 100.0);

    Significance {
        z,
        p_value,
        significant,
        confidence,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Standard normal CDF.
pub(crate) fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Abramowitz & Stegun 7.1.26 rational approximation of erf.
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0
        - (a1 * t + a2 * t.powi(2) + a3 * t.powi(3) + a4 * t.powi(4) + a5 * t.powi(5))
            * (-x * x).exp();

    sign * y
}
