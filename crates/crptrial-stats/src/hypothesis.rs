//! Two-sample hypothesis tests.
//!
//! # Examples
//!
//! ```
//! use crptrial_stats::hypothesis::students_t_test;
//!
//! let a = [5.1, 4.9, 5.2, 5.0, 4.8];
//! let b = [7.1, 6.9, 7.2, 7.0, 6.8];
//! let r = students_t_test(&a, &b).unwrap();
//! assert!(r.statistic < 0.0);
//! assert!(r.p_value < 0.01);
//! ```

use serde::{Deserialize, Serialize};
use u_numflow::special;

use crate::descriptive::DescriptiveStats;

/// Result of a hypothesis test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Test statistic.
    pub statistic: f64,
    /// Degrees of freedom.
    pub df: f64,
    /// Two-sided p-value.
    pub p_value: f64,
}

impl TestResult {
    /// Placeholder for a test that could not be computed.
    pub const UNDEFINED: Self = Self {
        statistic: f64::NAN,
        df: f64::NAN,
        p_value: f64::NAN,
    };

    #[must_use]
    pub fn is_defined(&self) -> bool {
        !self.statistic.is_nan() && !self.p_value.is_nan()
    }
}

/// Student's two-sample t-test with pooled variance: H₀: μ₁ = μ₂.
///
/// t = (x̄₁ - x̄₂) / (sₚ √(1/n₁ + 1/n₂)), df = n₁ + n₂ - 2.
///
/// # Arguments
///
/// * `a` - First sample
/// * `b` - Second sample
///
/// # Returns
///
/// The t statistic, its degrees of freedom and the two-sided p-value, or
/// `None` if either sample has fewer than 2 observations, contains
/// non-finite values, or both samples have zero variance.
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn students_t_test(a: &[f64], b: &[f64]) -> Option<TestResult> {
    if a.len() < 2 || b.len() < 2 {
        return None;
    }
    if a.iter().chain(b).any(|v| !v.is_finite()) {
        return None;
    }

    let sa = DescriptiveStats::new(a.iter().copied());
    let sb = DescriptiveStats::new(b.iter().copied());
    let n1 = sa.count as f64;
    let n2 = sb.count as f64;
    let df = n1 + n2 - 2.0;

    let pooled = ((n1 - 1.0) * sa.variance + (n2 - 1.0) * sb.variance) / df;
    let se_sq = pooled * (1.0 / n1 + 1.0 / n2);
    if se_sq < 1e-300 {
        return None;
    }

    let statistic = (sa.mean - sb.mean) / se_sq.sqrt();
    Some(TestResult {
        statistic,
        df,
        p_value: 2.0 * (1.0 - special::t_distribution_cdf(statistic.abs(), df)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_mean() {
        let a = [5.0, 5.1, 4.9, 5.0, 5.1, 4.9, 5.0, 5.0];
        let b = [5.0, 5.2, 4.8, 5.1, 4.9, 5.0, 5.1, 4.9];
        let r = students_t_test(&a, &b).unwrap();
        assert!(r.p_value > 0.3, "p = {}", r.p_value);
        assert_eq!(r.df, 14.0);
    }

    #[test]
    fn test_known_value() {
        // Hand-computed: means 2 and 4, pooled variance 1, n = 3 each
        // t = -2 / sqrt(2/3) = -2.449489742783178, df = 4
        let r = students_t_test(&[1.0, 2.0, 3.0], &[3.0, 4.0, 5.0]).unwrap();
        assert!((r.statistic + 2.449_489_742_783_178).abs() < 1e-12);
        assert_eq!(r.df, 4.0);
        assert!((r.p_value - 0.070_4).abs() < 5e-4, "p = {}", r.p_value);
    }

    #[test]
    fn test_different_sizes() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0, 7.0, 8.0];
        let r = students_t_test(&a, &b).unwrap();
        assert!(r.p_value < 0.05);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(students_t_test(&[1.0], &[2.0, 3.0]).is_none());
        assert!(students_t_test(&[], &[]).is_none());
        assert!(students_t_test(&[2.0, 2.0], &[2.0, 2.0]).is_none());
        assert!(students_t_test(&[1.0, f64::NAN], &[2.0, 3.0]).is_none());
    }

    #[test]
    fn test_undefined_result() {
        assert!(!TestResult::UNDEFINED.is_defined());
    }
}
