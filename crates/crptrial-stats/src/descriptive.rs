use serde::{Deserialize, Serialize};

use crate::percentiles::compute_percentile;

/// Descriptive statistics summarizing a dataset.
///
/// This structure contains the measures printed in summary tables: count,
/// central tendency, dispersion and quartiles for a dataset of `f64` values.
///
/// Dispersion uses the sample (`n - 1`) estimator, so a dataset with a single
/// value has an undefined (`NaN`) variance and standard deviation. An empty
/// dataset reports `count == 0` and `NaN` everywhere else.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DescriptiveStats {
    /// Number of values in the dataset.
    pub count: usize,
    /// The arithmetic mean (average) of the dataset.
    pub mean: f64,
    /// Sample standard deviation.
    pub std_dev: f64,
    /// Sample variance.
    pub variance: f64,
    /// The minimum value in the dataset.
    pub min: f64,
    /// 25th percentile.
    pub q1: f64,
    /// The median value of the dataset.
    pub median: f64,
    /// 75th percentile.
    pub q3: f64,
    /// The maximum value in the dataset.
    pub max: f64,
}

impl DescriptiveStats {
    /// Statistics of an empty dataset.
    pub const EMPTY: Self = Self {
        count: 0,
        mean: f64::NAN,
        std_dev: f64::NAN,
        variance: f64::NAN,
        min: f64::NAN,
        q1: f64::NAN,
        median: f64::NAN,
        q3: f64::NAN,
        max: f64::NAN,
    };

    /// Computes descriptive statistics from unsorted values.
    ///
    /// # Examples
    ///
    /// ```
    /// # use crptrial_stats::descriptive::DescriptiveStats;
    /// let stats = DescriptiveStats::new([5.0, 2.0, 4.0, 1.0, 3.0]);
    /// assert_eq!(stats.count, 5);
    /// assert_eq!(stats.min, 1.0);
    /// assert_eq!(stats.max, 5.0);
    /// assert_eq!(stats.mean, 3.0);
    /// assert_eq!(stats.median, 3.0);
    /// assert_eq!(stats.variance, 2.5);
    /// ```
    #[must_use]
    pub fn new<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let mut values = values.into_iter().collect::<Vec<_>>();
        values.sort_by(f64::total_cmp);
        Self::from_sorted(&values)
    }

    /// Computes descriptive statistics from pre-sorted values.
    ///
    /// # Panics
    ///
    /// Panics if `sorted_values` is not sorted in ascending order.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn from_sorted(sorted_values: &[f64]) -> Self {
        assert!(
            sorted_values.is_sorted_by(|a, b| a <= b),
            "values must be sorted in ascending order"
        );

        let (Some(&min), Some(&max)) = (sorted_values.first(), sorted_values.last()) else {
            return Self::EMPTY;
        };

        let count = sorted_values.len();
        let n = count as f64;
        let mean = sorted_values.iter().sum::<f64>() / n;
        let variance = if count < 2 {
            f64::NAN
        } else {
            sorted_values
                .iter()
                .map(|v| (v - mean).powi(2))
                .sum::<f64>()
                / (n - 1.0)
        };

        Self {
            count,
            mean,
            std_dev: variance.sqrt(),
            variance,
            min,
            q1: compute_percentile(sorted_values, 25.0),
            median: compute_percentile(sorted_values, 50.0),
            q3: compute_percentile(sorted_values, 75.0),
            max,
        }
    }

    /// Standard error of the mean (`std_dev / sqrt(n)`).
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn std_error(&self) -> f64 {
        self.std_dev / (self.count as f64).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_dataset() {
        let stats = DescriptiveStats::new([]);
        assert_eq!(stats.count, 0);
        assert!(stats.mean.is_nan());
        assert!(stats.std_dev.is_nan());
        assert!(stats.median.is_nan());
    }

    #[test]
    fn test_single_value_has_undefined_spread() {
        let stats = DescriptiveStats::new([42.0]);
        assert_eq!(stats.count, 1);
        assert_eq!(stats.mean, 42.0);
        assert_eq!(stats.median, 42.0);
        assert_eq!(stats.min, 42.0);
        assert_eq!(stats.max, 42.0);
        assert!(stats.std_dev.is_nan());
        assert!(stats.std_error().is_nan());
    }

    #[test]
    fn test_quartiles() {
        let stats = DescriptiveStats::new([4.0, 1.0, 3.0, 2.0]);
        assert_eq!(stats.q1, 1.75);
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.q3, 3.25);
    }

    #[test]
    fn test_sample_std_dev() {
        let stats = DescriptiveStats::new([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((stats.variance - 32.0 / 7.0).abs() < 1e-12);
        assert!((stats.std_error() - stats.std_dev / 8f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "values must be sorted")]
    fn test_from_sorted_rejects_unsorted() {
        let _ = DescriptiveStats::from_sorted(&[3.0, 1.0]);
    }
}
