//! Missing value handling.
//!
//! Per column, based on the fraction `p` of nulls:
//!
//! - `p == 0`: nothing happens
//! - `p > missing_impute_max`: the column is flagged and left for the user
//! - otherwise nulls are imputed (median, forward/backward fill or mode),
//!   and when `p >= missing_indicator_threshold` a `<column>_was_missing`
//!   flag is added alongside
//!
//! Indicators and fills are applied in one `with_columns` call, so every
//! indicator reflects the data before imputation. Null counts and medians
//! come from one aggregate and all modes from one more query, so the step
//! makes at most two full passes whatever the column count.

use crate::error::Result;
use crate::pipeline::{PipelineContext, PipelineStage, PipelineStep, StepResult};
use crate::table::Table;
use crate::types::{LogEntry, Role, Severity, StepAction};
use crate::utils::{is_datetime_dtype, is_numeric_dtype};
use polars::prelude::*;
use serde_json::json;
use std::collections::HashSet;
use tracing::debug;

/// Suffix of the boolean flag columns this step adds.
pub const INDICATOR_SUFFIX: &str = "_was_missing";

/// Fill value used when a categorical column has no mode.
const MODE_FALLBACK: &str = "Missing";

fn indicator_name(column: &str) -> String {
    format!("{column}{INDICATOR_SUFFIX}")
}

fn median_alias(column: &str) -> String {
    format!("{column}__median")
}

/// How a column's nulls get filled.
#[derive(Debug, Clone, PartialEq)]
enum Fill {
    Median(f64),
    ForwardBackward,
    Mode(String),
}

impl Fill {
    fn method(&self) -> &'static str {
        match self {
            Self::Median(_) => "median",
            Self::ForwardBackward => "ffill",
            Self::Mode(_) => "mode",
        }
    }

    fn value(&self) -> String {
        match self {
            Self::Median(m) => m.to_string(),
            Self::ForwardBackward => "ffill".to_string(),
            Self::Mode(v) => v.clone(),
        }
    }

    fn expr(&self, name: &str, dtype: &DataType) -> Expr {
        match self {
            Self::Median(m) => col(name).fill_null(lit(*m)),
            Self::ForwardBackward => col(name)
                .fill_null_with_strategy(FillNullStrategy::Forward(None))
                .fill_null_with_strategy(FillNullStrategy::Backward(None)),
            Self::Mode(value) => match dtype {
                DataType::String => col(name).fill_null(lit(value.clone())),
                DataType::Boolean => col(name).fill_null(lit(value == "true")),
                other => col(name)
                    .cast(DataType::String)
                    .fill_null(lit(value.clone()))
                    .cast(other.clone()),
            },
        }
        .alias(name)
    }
}

/// Adds missingness indicators and imputes columns with few nulls.
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingValueHandler;

impl PipelineStep for MissingValueHandler {
    fn name(&self) -> &'static str {
        "MissingValueHandler"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::MissingValues
    }

    fn run(&self, table: Box<dyn Table>, ctx: &mut PipelineContext) -> Result<StepResult> {
        let config = ctx.config();
        let rows = table.height();
        if rows == 0 {
            return Ok(StepResult::new(table));
        }
        let schema = table.schema()?;
        let existing: HashSet<&str> = schema.iter().map(|(name, _)| name.as_str()).collect();

        // One pass for every null count and numeric median.
        let mut aggs = Vec::with_capacity(schema.len() * 2);
        for (name, dtype) in &schema {
            aggs.push(
                col(name.as_str())
                    .null_count()
                    .cast(DataType::UInt64)
                    .alias(name.as_str()),
            );
            if is_numeric_dtype(dtype) {
                aggs.push(
                    col(name.as_str())
                        .cast(DataType::Float64)
                        .median()
                        .alias(median_alias(name)),
                );
            }
        }
        let stats = table.aggregate(aggs)?;

        let mut logs = Vec::new();
        let mut warnings = Vec::new();

        // Decide every column first so all modes come from a single query.
        let mut plans: Vec<(&String, &DataType, usize, Option<Fill>)> = Vec::new();
        let mut mode_columns = Vec::new();
        for (name, dtype) in &schema {
            let nulls = stats
                .column(name)?
                .as_materialized_series()
                .u64()?
                .get(0)
                .unwrap_or(0) as usize;
            if nulls == 0 {
                continue;
            }
            let pct = nulls as f64 / rows as f64;

            if pct > config.missing_impute_max {
                warnings.push(format!(
                    "Column '{}' has >{:.0}% missing values ({:.1}%). User decision required.",
                    name,
                    config.missing_impute_max * 100.0,
                    pct * 100.0
                ));
                logs.push(
                    LogEntry::new(self.name(), StepAction::FlagHighMissing)
                        .column(name.as_str())
                        .before(json!({ "null_count": nulls, "null_pct": pct }))
                        .reason("Too many missing values for automatic imputation.")
                        .severity(Severity::Warning),
                );
                continue;
            }

            let role = ctx.role(name);
            let fill = if is_numeric_dtype(dtype) && role != Role::IdCol {
                let median = stats
                    .column(&median_alias(name))?
                    .as_materialized_series()
                    .f64()?
                    .get(0);
                match median {
                    Some(m) => Some(Fill::Median(m)),
                    None => continue,
                }
            } else if is_datetime_dtype(dtype) || role == Role::DatetimeCol {
                Some(Fill::ForwardBackward)
            } else {
                mode_columns.push(name.clone());
                None
            };
            plans.push((name, dtype, nulls, fill));
        }

        let mut modes = table.modes(&mode_columns)?;

        let mut exprs = Vec::new();
        let mut modified = Vec::new();
        for (name, dtype, nulls, fill) in plans {
            let fill = fill.unwrap_or_else(|| {
                Fill::Mode(
                    modes
                        .remove(name.as_str())
                        .unwrap_or_else(|| MODE_FALLBACK.to_string()),
                )
            });

            let pct = nulls as f64 / rows as f64;
            let indicator = indicator_name(name);
            if pct >= config.missing_indicator_threshold && !existing.contains(indicator.as_str()) {
                exprs.push(col(name.as_str()).is_null().alias(indicator.as_str()));
                logs.push(
                    LogEntry::new(self.name(), StepAction::AddIndicator)
                        .column(name.as_str())
                        .after(json!({ "indicator": indicator })),
                );
                modified.push(indicator.clone());
            }

            debug!("Imputing {} nulls in '{}' with {}", nulls, name, fill.method());
            exprs.push(fill.expr(name, dtype));
            logs.push(
                LogEntry::new(self.name(), StepAction::Impute)
                    .column(name.as_str())
                    .before(json!({ "null_count": nulls }))
                    .after(json!({ "method": fill.method(), "fill_val": fill.value() })),
            );
            modified.push(name.clone());
        }

        if exprs.is_empty() {
            return Ok(StepResult::new(table)
                .with_logs(logs)
                .with_warnings(warnings));
        }

        let table = table.with_columns(exprs)?;
        Ok(StepResult::new(table)
            .with_logs(logs)
            .with_warnings(warnings)
            .with_modified(modified))
    }
}
