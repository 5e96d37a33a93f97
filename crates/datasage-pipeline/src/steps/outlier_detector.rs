//! Outlier annotation.
//!
//! Each numeric feature column is tested for normality on a bounded sample.
//! Approximately normal columns use the Z-score rule, everything else the
//! Tukey IQR rule. Counts are logged; the table is never touched.

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::{PipelineContext, PipelineStage, PipelineStep, StepResult};
use crate::profiler::statistics::{iqr_outlier_count, zscore_outlier_count};
use crate::table::Table;
use crate::types::{LogEntry, Role, Severity, StepAction};
use crate::utils::{finite_values, is_numeric_dtype, round_to};
use normality::{dagostino_k_squared, shapiro_wilk};
use polars::prelude::*;
use serde_json::json;
use std::fmt;
use tracing::{debug, warn};

/// Share of outlying values above which `flag_outliers` is a warning.
const WARNING_PCT: f64 = 0.05;

/// The rule used to count outliers in a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlierMethod {
    ZScore,
    Iqr,
}

impl fmt::Display for OutlierMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZScore => f.write_str("Z-Score"),
            Self::Iqr => f.write_str("IQR"),
        }
    }
}

/// Outliers found in one column.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierFinding {
    pub method: OutlierMethod,
    pub count: usize,
    pub pct: f64,
}

/// p-value of the normality test suited to the sample size.
///
/// A test that cannot run (too few or constant values) reads as "not
/// normal", which routes the column to the IQR rule.
fn normality_p_value(values: &[f64], config: &PipelineConfig) -> f64 {
    let outcome = if values.len() < config.exact_normality_max_n {
        shapiro_wilk(values.to_vec()).map(|c| c.p_value)
    } else {
        dagostino_k_squared(values.to_vec()).map(|c| c.p_value)
    };
    match outcome {
        Ok(p) if p.is_finite() => p,
        Ok(_) => 0.0,
        Err(e) => {
            debug!("Normality test unavailable: {:?}", e);
            0.0
        }
    }
}

/// Count outliers in finite `values`, choosing the rule by normality.
pub fn detect_outliers(values: &[f64], config: &PipelineConfig) -> OutlierFinding {
    let method = if normality_p_value(values, config) > config.normality_alpha {
        OutlierMethod::ZScore
    } else {
        OutlierMethod::Iqr
    };
    let count = match method {
        OutlierMethod::ZScore => zscore_outlier_count(values, config.zscore_threshold),
        OutlierMethod::Iqr => iqr_outlier_count(values, config.iqr_multiplier),
    };
    let pct = if values.is_empty() {
        0.0
    } else {
        count as f64 / values.len() as f64
    };
    OutlierFinding { method, count, pct }
}

/// Flags statistical outliers and domain sanity violations.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutlierDetector;

impl OutlierDetector {
    fn inspect(
        &self,
        series: &Series,
        ctx: &PipelineContext,
        logs: &mut Vec<LogEntry>,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        let name = series.name().as_str();
        let values = finite_values(series)?;

        for text in ctx.domain_profile().sanity_warnings(name, &values) {
            warn!("{}", text);
            logs.push(
                LogEntry::new(self.name(), StepAction::DomainSanityWarning)
                    .column(name)
                    .reason(text.as_str())
                    .severity(Severity::Warning),
            );
            warnings.push(text);
        }

        let config = ctx.config();
        if values.len() < config.outlier_min_values {
            debug!("'{}' has {} valid values, skipping outlier test", name, values.len());
            return Ok(());
        }

        let finding = detect_outliers(&values, config);
        debug!(
            "'{}': {} outliers by {} ({} values)",
            name,
            finding.count,
            finding.method,
            values.len()
        );
        if finding.count > 0 {
            let severity = if finding.pct > WARNING_PCT {
                Severity::Warning
            } else {
                Severity::Info
            };
            logs.push(
                LogEntry::new(self.name(), StepAction::FlagOutliers)
                    .column(name)
                    .after(json!({
                        "count": finding.count,
                        "pct": round_to(finding.pct, 4),
                        "method": finding.method.to_string(),
                    }))
                    .severity(severity),
            );
        }
        Ok(())
    }
}

impl PipelineStep for OutlierDetector {
    fn name(&self) -> &'static str {
        "OutlierDetector"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::Outliers
    }

    fn run(&self, table: Box<dyn Table>, ctx: &mut PipelineContext) -> Result<StepResult> {
        let sample = table.sample(ctx.config().outlier_sample_rows)?;

        let mut logs = Vec::new();
        let mut warnings = Vec::new();
        for column in sample.get_columns() {
            let series = column.as_materialized_series();
            if !is_numeric_dtype(series.dtype())
                || matches!(ctx.role(series.name()), Role::IdCol | Role::DatetimeCol)
            {
                continue;
            }

            let mut column_logs = Vec::new();
            let mut column_warnings = Vec::new();
            match self.inspect(series, ctx, &mut column_logs, &mut column_warnings) {
                Ok(()) => {
                    logs.extend(column_logs);
                    warnings.extend(column_warnings);
                }
                Err(e) => {
                    warn!("Skipping outlier check for '{}': {}", series.name(), e);
                    logs.push(
                        LogEntry::new(self.name(), StepAction::SkipColumn)
                            .column(series.name().as_str())
                            .reason(e.to_string())
                            .severity(Severity::Warning),
                    );
                    warnings.push(format!(
                        "OutlierDetector skipped column '{}' due to error: {}",
                        series.name(),
                        e
                    ));
                }
            }
        }

        Ok(StepResult::new(table)
            .with_logs(logs)
            .with_warnings(warnings))
    }
}
