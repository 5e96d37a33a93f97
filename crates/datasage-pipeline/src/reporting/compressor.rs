//! Token-budget compression of a dataset profile.

use crate::types::{DatasetProfile, DistributionType, HighCorrelation, Role, Shape, ValueCount};
use crate::utils::round_to;
use serde::{Deserialize, Serialize};

const DECIMALS: i32 = 3;
const TOP_VALUES: usize = 3;

/// The subset of a [`DatasetProfile`] small enough for an LLM context window.
///
/// Extrema, moments and unique counts are dropped; floats are rounded to
/// three decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedProfile {
    pub shape: Shape,
    pub domain: String,
    pub dataset_quality_score: f64,
    pub warnings: Vec<String>,
    pub high_correlations: Vec<HighCorrelation>,
    pub columns: Vec<CompressedColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedColumn {
    pub name: String,
    pub role: Role,
    pub dtype: String,
    pub null_pct: f64,
    pub distribution_type: DistributionType,
    pub outlier_pct: f64,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub top_3_values: Vec<ValueCount>,
}

pub fn compress_for_agents(profile: &DatasetProfile) -> CompressedProfile {
    CompressedProfile {
        shape: profile.shape,
        domain: profile.domain.clone(),
        dataset_quality_score: round_to(profile.dataset_quality_score, DECIMALS),
        warnings: profile.warnings.clone(),
        high_correlations: profile
            .high_correlations
            .iter()
            .map(|h| HighCorrelation {
                correlation: round_to(h.correlation, DECIMALS),
                ..h.clone()
            })
            .collect(),
        columns: profile
            .columns
            .iter()
            .map(|c| CompressedColumn {
                name: c.name.clone(),
                role: c.role,
                dtype: c.dtype.clone(),
                null_pct: round_to(c.null_pct, DECIMALS),
                distribution_type: c.distribution_type,
                outlier_pct: round_to(c.outlier_pct, DECIMALS),
                top_3_values: c.top_k_values.iter().take(TOP_VALUES).cloned().collect(),
            })
            .collect(),
    }
}
