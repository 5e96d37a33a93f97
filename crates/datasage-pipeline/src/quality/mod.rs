//! Dataset quality scoring.
//!
//! The score starts at 100 and loses points for missingness and outliers:
//! `null_pct * 50` for every column plus `min(10, outlier_pct * 100)` for
//! every column with an outlier count (only numeric columns get one). It is
//! floored at 0 and rounded to one decimal, and depends on nothing but the
//! column profiles.
//!
//! The null penalty is summed over all columns without normalizing by the
//! column count, so a wide table with modest per-column missingness can
//! score 0.

use crate::types::ColumnProfile;
use crate::utils::round_to;
use serde::{Deserialize, Serialize};
use std::fmt;

const NULL_PENALTY_WEIGHT: f64 = 50.0;
const OUTLIER_PENALTY_CAP: f64 = 10.0;

/// Total penalty for one column.
fn column_penalty(column: &ColumnProfile) -> f64 {
    let outlier = (column.outlier_pct * 100.0).min(OUTLIER_PENALTY_CAP);
    column.null_pct * NULL_PENALTY_WEIGHT + outlier
}

/// Recompute the dataset quality score from column profiles alone.
pub fn quality_score(columns: &[ColumnProfile]) -> f64 {
    let penalty: f64 = columns.iter().map(column_penalty).sum();
    round_to((100.0 - penalty).max(0.0), 1)
}

/// Human-facing band of a quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLabel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityLabel {
    pub fn from_score(score: f64) -> Self {
        if score >= 91.0 {
            Self::Excellent
        } else if score >= 71.0 {
            Self::Good
        } else if score >= 41.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
        }
    }
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use pretty_assertions::assert_eq;

    fn column(null_pct: f64, outlier_pct: f64) -> ColumnProfile {
        let mut profile = ColumnProfile::empty("c", "f64", Role::FeatureCol);
        profile.null_pct = null_pct;
        profile.outlier_pct = outlier_pct;
        profile
    }

    #[test]
    fn test_clean_dataset_scores_100() {
        assert_eq!(quality_score(&[column(0.0, 0.0), column(0.0, 0.0)]), 100.0);
        assert_eq!(quality_score(&[]), 100.0);
    }

    #[test]
    fn test_penalties_add_up() {
        // 0.1 * 50 + min(10, 2.0) + 0.2 * 50 + min(10, 30.0)
        let score = quality_score(&[column(0.1, 0.02), column(0.2, 0.3)]);
        assert_eq!(score, 73.0);
    }

    #[test]
    fn test_score_is_floored_at_zero() {
        let columns: Vec<ColumnProfile> = (0..10).map(|_| column(0.5, 0.0)).collect();
        assert_eq!(quality_score(&columns), 0.0);
    }

    #[test]
    fn test_score_is_monotonic() {
        let mut previous = 100.0;
        for step in 0..=20 {
            let pct = step as f64 * 0.05;
            let score = quality_score(&[column(pct, 0.0), column(0.0, pct)]);
            assert!(score <= previous);
            assert!((0.0..=100.0).contains(&score));
            previous = score;
        }
    }

    #[test]
    fn test_quality_label_bands() {
        assert_eq!(QualityLabel::from_score(100.0), QualityLabel::Excellent);
        assert_eq!(QualityLabel::from_score(91.0), QualityLabel::Excellent);
        assert_eq!(QualityLabel::from_score(90.9), QualityLabel::Good);
        assert_eq!(QualityLabel::from_score(71.0), QualityLabel::Good);
        assert_eq!(QualityLabel::from_score(41.0), QualityLabel::Fair);
        assert_eq!(QualityLabel::from_score(40.9), QualityLabel::Poor);
        assert_eq!(QualityLabel::Fair.to_string(), "Fair");
    }
}
