//! Dataset profiling.
//!
//! The [`Summarizer`] turns the cleaned table into a [`DatasetProfile`]:
//! per-column statistics and shape classification, high correlations
//! between numeric columns, class-balance snapshots, target candidates and
//! the quality score.

pub mod statistics;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::PipelineContext;
use crate::quality::quality_score;
use crate::types::{
    ColumnProfile, DatasetProfile, DistributionType, HighCorrelation, Role, Shape, ValueCount,
};
use crate::utils::{finite_values, is_numeric_dtype, is_text_dtype, round_to};
use polars::prelude::*;
use statistics::{iqr_outlier_count, pearson, summarize_series};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Multiplier of the IQR fence used for profile outlier counts.
const PROFILE_IQR_MULTIPLIER: f64 = 3.0;

/// Numeric columns need more values than this for an outlier count.
const PROFILE_OUTLIER_MIN_VALUES: usize = 10;

/// Numeric columns with fewer distinct values than this look categorical.
const NUMERIC_CATEGORICAL_MAX_UNIQUES: usize = 10;

/// Smallest cardinality that gets a class-balance snapshot or counts as a target.
const MIN_CLASSES: usize = 2;

/// Builds the dataset profile from a cleaned table.
pub struct Summarizer<'a> {
    config: &'a PipelineConfig,
}

impl<'a> Summarizer<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Profile `df` using the roles, domain and warnings in `ctx`.
    pub fn summarize(&self, df: &DataFrame, ctx: &PipelineContext) -> Result<DatasetProfile> {
        self.build_profile(df, ctx)
            .map_err(|e| PipelineError::Internal(format!("Summarizing failed: {e:#}")))
    }

    fn build_profile(&self, df: &DataFrame, ctx: &PipelineContext) -> anyhow::Result<DatasetProfile> {
        let rows = df.height();
        let mut columns = Vec::with_capacity(df.width());
        let mut class_balance = BTreeMap::new();
        let mut potential_targets = Vec::new();
        let mut numeric_columns = Vec::new();

        for column in df.get_columns() {
            let series = column.as_materialized_series();
            let name = series.name().to_string();
            let role = ctx.role(&name);
            let counts = value_counts(series)?;

            let profile = self.profile_column(series, role, rows, &counts)?;

            let classes = profile.unique_count;
            let is_categorical_like =
                series.dtype() == &DataType::Boolean || is_text_dtype(series.dtype());
            if is_categorical_like
                && (MIN_CLASSES..=self.config.class_balance_max_uniques).contains(&classes)
            {
                class_balance.insert(name.clone(), counts.iter().cloned().collect());
            }
            if (MIN_CLASSES..=self.config.class_balance_max_uniques).contains(&classes)
                && role != Role::IdCol
            {
                potential_targets.push(name.clone());
            }
            if is_numeric_dtype(series.dtype()) {
                numeric_columns.push(name);
            }
            columns.push(profile);
        }

        let high_correlations = self.high_correlations(df, &numeric_columns)?;
        let datetime_columns = ctx.columns_with_role(Role::DatetimeCol);
        let text_columns = ctx.columns_with_role(Role::TextCol);
        let datetime_columns: Vec<String> = datetime_columns
            .into_iter()
            .filter(|c| df.column(c).is_ok())
            .collect();
        let text_columns: Vec<String> = text_columns
            .into_iter()
            .filter(|c| df.column(c).is_ok())
            .collect();

        let score = quality_score(&columns);
        debug!(
            "Profiled {} columns, {} high correlations, quality {}",
            columns.len(),
            high_correlations.len(),
            score
        );

        Ok(DatasetProfile {
            shape: Shape {
                rows,
                cols: df.width(),
            },
            memory_mb: round_to(df.estimated_size() as f64 / (1024.0 * 1024.0), 4),
            domain: ctx.domain.clone(),
            columns,
            high_correlations,
            time_series_detected: !datetime_columns.is_empty(),
            datetime_columns,
            text_columns,
            potential_target_columns: potential_targets,
            class_balance,
            dataset_quality_score: score,
            warnings: ctx.warnings.clone(),
            generated_at: chrono::Utc::now(),
        })
    }

    fn profile_column(
        &self,
        series: &Series,
        role: Role,
        rows: usize,
        counts: &[(String, usize)],
    ) -> anyhow::Result<ColumnProfile> {
        let mut profile =
            ColumnProfile::empty(series.name().as_str(), series.dtype().to_string(), role);

        let null_count = series.null_count();
        profile.null_count = null_count;
        profile.unique_count = counts.len();
        if rows > 0 {
            profile.null_pct = round_to(null_count as f64 / rows as f64, 4);
            profile.unique_pct = round_to(counts.len() as f64 / rows as f64, 4);
        }
        profile.top_k_values = counts
            .iter()
            .take(self.config.top_k_values)
            .map(|(value, count)| ValueCount {
                value: value.clone(),
                count: *count,
            })
            .collect();

        let dtype = series.dtype();
        if dtype == &DataType::Boolean {
            profile.distribution_type = DistributionType::Categorical;
        } else if is_text_dtype(dtype) {
            profile.distribution_type = if role == Role::TextCol {
                DistributionType::Text
            } else {
                DistributionType::Categorical
            };
        } else if is_numeric_dtype(dtype) {
            match summarize_series(series)? {
                Some(summary) => {
                    profile.min = Some(summary.min);
                    profile.max = Some(summary.max);
                    profile.mean = Some(summary.mean);
                    profile.median = Some(summary.median);
                    profile.std = summary.std;
                    profile.skewness = summary.skewness;
                    profile.kurtosis = summary.kurtosis;
                    profile.distribution_type = classify_numeric(summary.skewness, counts.len());
                }
                None => profile.distribution_type = DistributionType::Unknown,
            }

            let values = finite_values(series)?;
            if values.len() > PROFILE_OUTLIER_MIN_VALUES {
                let outliers = iqr_outlier_count(&values, PROFILE_IQR_MULTIPLIER);
                profile.outlier_count = outliers;
                profile.outlier_pct = round_to(outliers as f64 / values.len() as f64, 4);
            }
        }

        Ok(profile)
    }

    /// Pairs of numeric columns with |r| above the configured threshold.
    fn high_correlations(
        &self,
        df: &DataFrame,
        numeric_columns: &[String],
    ) -> anyhow::Result<Vec<HighCorrelation>> {
        let mut vectors = Vec::with_capacity(numeric_columns.len());
        for name in numeric_columns {
            let floats = df
                .column(name)?
                .as_materialized_series()
                .cast(&DataType::Float64)?;
            let values: Vec<Option<f64>> = floats.f64()?.into_iter().collect();
            vectors.push(values);
        }

        let mut pairs = Vec::new();
        for i in 0..numeric_columns.len() {
            for j in (i + 1)..numeric_columns.len() {
                let Some(r) = pearson(&vectors[i], &vectors[j]) else {
                    continue;
                };
                if r.abs() > self.config.high_correlation_threshold {
                    pairs.push(HighCorrelation {
                        col1: numeric_columns[i].clone(),
                        col2: numeric_columns[j].clone(),
                        correlation: round_to(r, 4),
                        concern: true,
                    });
                }
            }
        }
        Ok(pairs)
    }
}

/// Shape of a numeric column from its skewness and cardinality.
fn classify_numeric(skewness: Option<f64>, unique_count: usize) -> DistributionType {
    match skewness {
        Some(s) if s > 1.0 => DistributionType::RightSkewed,
        Some(s) if s < -1.0 => DistributionType::LeftSkewed,
        _ if unique_count < NUMERIC_CATEGORICAL_MAX_UNIQUES => DistributionType::Categorical,
        _ => DistributionType::Normal,
    }
}

/// Non-null values rendered as strings with their counts.
///
/// Ordered by count descending, then value ascending.
pub fn value_counts(series: &Series) -> anyhow::Result<Vec<(String, usize)>> {
    let as_str = series.cast(&DataType::String)?;
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in as_str.str()?.into_iter().flatten() {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut pairs: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(value, count)| (value.to_string(), count))
        .collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(pairs)
}
