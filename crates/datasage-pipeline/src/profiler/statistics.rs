//! Numeric statistics shared by the outlier detector and the summarizer.
//!
//! All functions work on finite values only; callers drop nulls and
//! non-finite entries first (see [`crate::utils::finite_values`]).

use anyhow::Result;
use polars::prelude::*;

/// Moments and extrema of one numeric column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (n - 1); `None` below two values.
    pub std: Option<f64>,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
}

impl NumericSummary {
    /// Summarize `values`, or `None` when there are none.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Some(Self {
            min: *sorted.first()?,
            max: *sorted.last()?,
            mean: mean(values)?,
            median: quantile(&sorted, 0.5)?,
            std: sample_std(values),
            skewness: skewness(values),
            kurtosis: excess_kurtosis(values),
        })
    }
}

/// Summarize a numeric series, ignoring nulls and non-finite values.
pub(crate) fn summarize_series(series: &Series) -> Result<Option<NumericSummary>> {
    let values = crate::utils::finite_values(series)?;
    Ok(NumericSummary::from_values(&values))
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Central moment of order `k` with the biased (1/n) normalisation.
fn central_moment(values: &[f64], mean: f64, k: i32) -> f64 {
    values.iter().map(|v| (v - mean).powi(k)).sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1).
pub fn sample_std(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (n - 1) as f64).sqrt())
}

/// Population standard deviation (n).
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    Some(central_moment(values, m, 2).sqrt())
}

/// Quantile of already sorted values with linear interpolation.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Adjusted Fisher-Pearson skewness (G1). Needs at least three values.
pub fn skewness(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let m = mean(values)?;
    let m2 = central_moment(values, m, 2);
    if m2 == 0.0 {
        return Some(0.0);
    }
    let g1 = central_moment(values, m, 3) / m2.powf(1.5);
    let n = n as f64;
    Some((n * (n - 1.0)).sqrt() / (n - 2.0) * g1)
}

/// Bias-corrected excess kurtosis (G2). Needs at least four values.
pub fn excess_kurtosis(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 4 {
        return None;
    }
    let m = mean(values)?;
    let m2 = central_moment(values, m, 2);
    if m2 == 0.0 {
        return Some(0.0);
    }
    let g2 = central_moment(values, m, 4) / (m2 * m2) - 3.0;
    let n = n as f64;
    Some((n - 1.0) / ((n - 2.0) * (n - 3.0)) * ((n + 1.0) * g2 + 6.0))
}

/// Pearson correlation over the rows where both values are present.
pub fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) if a.is_finite() && b.is_finite() => Some((*a, *b)),
            _ => None,
        })
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        cov += (a - mean_x) * (b - mean_y);
        var_x += (a - mean_x).powi(2);
        var_y += (b - mean_y).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Tukey fences `[Q1 - k*IQR, Q3 + k*IQR]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fences {
    pub lower: f64,
    pub upper: f64,
}

pub fn iqr_fences(values: &[f64], multiplier: f64) -> Option<Fences> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let q1 = quantile(&sorted, 0.25)?;
    let q3 = quantile(&sorted, 0.75)?;
    let iqr = q3 - q1;
    Some(Fences {
        lower: q1 - multiplier * iqr,
        upper: q3 + multiplier * iqr,
    })
}

/// Values outside the Tukey fences.
pub fn iqr_outlier_count(values: &[f64], multiplier: f64) -> usize {
    match iqr_fences(values, multiplier) {
        Some(fences) => values
            .iter()
            .filter(|v| **v < fences.lower || **v > fences.upper)
            .count(),
        None => 0,
    }
}

/// Values whose |z| (population std) exceeds `threshold`.
pub fn zscore_outlier_count(values: &[f64], threshold: f64) -> usize {
    let (Some(m), Some(std)) = (mean(values), population_std(values)) else {
        return 0;
    };
    if std == 0.0 {
        return 0;
    }
    values
        .iter()
        .filter(|v| ((**v - m) / std).abs() > threshold)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    // ==================== moment tests ====================

    #[test]
    fn test_sample_std() {
        // variance = 10 / 4
        let std = sample_std(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert!(close(std, 2.5f64.sqrt()));
        assert_eq!(sample_std(&[5.0]), None);
    }

    #[test]
    fn test_skewness_matches_adjusted_estimator() {
        // adjusted Fisher-Pearson skewness of [1, 2, 3, 10]
        let skew = skewness(&[1.0, 2.0, 3.0, 10.0]).unwrap();
        assert!((skew - 1.763_632).abs() < 1e-5);
        assert_eq!(skewness(&[1.0, 2.0]), None);
        assert_eq!(skewness(&[4.0, 4.0, 4.0]), Some(0.0));
    }

    #[test]
    fn test_excess_kurtosis_matches_adjusted_estimator() {
        // unbiased excess kurtosis of [1, 2, 3, 4, 100]
        let kurt = excess_kurtosis(&[1.0, 2.0, 3.0, 4.0, 100.0]).unwrap();
        assert!((kurt - 4.986_866).abs() < 1e-5);
        assert_eq!(excess_kurtosis(&[1.0, 2.0, 3.0]), None);
    }

    #[test]
    fn test_numeric_summary() {
        let summary = NumericSummary::from_values(&[3.0, 1.0, 2.0, 4.0]).unwrap();
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 4.0);
        assert_eq!(summary.mean, 2.5);
        assert_eq!(summary.median, 2.5);
        assert!(NumericSummary::from_values(&[]).is_none());
    }

    #[test]
    fn test_summarize_series_skips_nulls() {
        let series = Series::new("x".into(), &[Some(1.0f64), None, Some(3.0), Some(f64::NAN)]);
        let summary = summarize_series(&series).unwrap().unwrap();
        assert_eq!(summary.mean, 2.0);
        assert_eq!(summary.std, Some(2.0f64.sqrt()));
    }

    // ==================== quantile tests ====================

    #[test]
    fn test_quantile_linear_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.25), Some(1.75));
        assert_eq!(quantile(&sorted, 0.5), Some(2.5));
        assert_eq!(quantile(&sorted, 1.0), Some(4.0));
        assert_eq!(quantile(&[], 0.5), None);
    }

    // ==================== correlation tests ====================

    #[test]
    fn test_pearson_pairwise_complete() {
        let x = [Some(1.0), Some(2.0), None, Some(4.0)];
        let y = [Some(2.0), Some(4.0), Some(100.0), Some(8.0)];
        assert!(close(pearson(&x, &y).unwrap(), 1.0));

        let flat = [Some(1.0), Some(1.0), Some(1.0)];
        assert_eq!(pearson(&flat, &flat), None);
    }

    // ==================== outlier rule tests ====================

    #[test]
    fn test_iqr_outliers() {
        let mut values: Vec<f64> = (1..=20).map(f64::from).collect();
        values.push(500.0);
        assert_eq!(iqr_outlier_count(&values, 3.0), 1);
        assert_eq!(iqr_outlier_count(&values[..20], 3.0), 0);
    }

    #[test]
    fn test_zscore_outliers() {
        let mut values = vec![10.0; 50];
        values.extend([11.0, 9.0, 10.5, 9.5]);
        values.push(40.0);
        assert_eq!(zscore_outlier_count(&values, 3.5), 1);
        assert_eq!(zscore_outlier_count(&[5.0, 5.0, 5.0], 3.5), 0);
    }
}
