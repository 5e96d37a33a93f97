//! Dtype repair for text columns.
//!
//! Every text column has its surrounding whitespace stripped. A sample of
//! the stripped values then decides whether the column is really numeric,
//! boolean or (for columns the schema analyzer marked as datetimes)
//! temporal. All changes go out in a single `with_columns` call.

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::{PipelineContext, PipelineStage, PipelineStep, StepResult};
use crate::table::Table;
use crate::types::{LogEntry, Role, StepAction};
use crate::utils::{
    FALSE_TOKENS, NULL_TOKENS, TRUE_TOKENS, is_boolean_token, is_text_dtype, parse_numeric_string,
    temporal_parse,
};
use polars::prelude::*;
use serde_json::json;
use tracing::{debug, warn};

/// A coercion decided for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Coercion {
    Numeric { rate: f64 },
    Boolean,
    Datetime { dtype: DataType, rate: f64 },
}

/// Decide the coercion for a column from its stripped, non-null sample values.
///
/// `None` means the column stays text.
pub fn decide_coercion(
    values: &[String],
    role: Role,
    config: &PipelineConfig,
) -> Result<Option<Coercion>> {
    if values.is_empty() {
        return Ok(None);
    }

    let parsed = values
        .iter()
        .filter(|v| parse_numeric_string(v).is_some())
        .count();
    let rate = parsed as f64 / values.len() as f64;
    // Columns that already parse completely were typed by the loader; a
    // stray string is what this rule repairs.
    if rate >= config.numeric_coercion_ratio && rate < 1.0 {
        return Ok(Some(Coercion::Numeric { rate }));
    }

    if looks_boolean(values) {
        return Ok(Some(Coercion::Boolean));
    }

    if role == Role::DatetimeCol {
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        let series = Series::new("sample".into(), refs);
        let parsed = temporal_parse(&series)?;
        return Ok(Some(Coercion::Datetime {
            dtype: parsed.dtype,
            rate: parsed.rate,
        }));
    }

    Ok(None)
}

/// All values belong to the boolean vocabulary and at least one is a real
/// `true`/`false` token rather than a null-like one.
fn looks_boolean(values: &[String]) -> bool {
    let mut saw_value = false;
    for value in values {
        if !is_boolean_token(value) {
            return false;
        }
        saw_value |= !NULL_TOKENS.contains(&value.trim().to_lowercase().as_str());
    }
    saw_value
}

fn stripped(name: &str) -> Expr {
    col(name)
        .cast(DataType::String)
        .str()
        .strip_chars(lit(NULL))
}

fn any_token(value: Expr, tokens: &[&str]) -> Expr {
    tokens
        .iter()
        .map(|token| value.clone().eq(lit(*token)))
        .reduce(|acc, e| acc.or(e))
        .unwrap_or_else(|| lit(false))
}

fn boolean_expr(name: &str) -> Expr {
    let lower = stripped(name).str().to_lowercase();
    when(any_token(lower.clone(), &TRUE_TOKENS))
        .then(lit(true))
        .when(any_token(lower, &FALSE_TOKENS))
        .then(lit(false))
        .otherwise(lit(NULL).cast(DataType::Boolean))
        .alias(name)
}

/// Strips text columns and coerces the ones that are really numbers,
/// booleans or timestamps.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeFixer;

impl PipelineStep for TypeFixer {
    fn name(&self) -> &'static str {
        "TypeFixer"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::TypeFixing
    }

    fn run(&self, table: Box<dyn Table>, ctx: &mut PipelineContext) -> Result<StepResult> {
        let config = ctx.config();
        let schema = table.schema()?;
        let text_columns: Vec<(String, DataType)> = schema
            .into_iter()
            .filter(|(_, dtype)| is_text_dtype(dtype))
            .collect();
        if text_columns.is_empty() {
            return Ok(StepResult::new(table));
        }

        // Padding is counted over the whole table; coercions are decided on a sample.
        let padding = table.aggregate(
            text_columns
                .iter()
                .map(|(name, _)| {
                    col(name.as_str())
                        .cast(DataType::String)
                        .neq(stripped(name))
                        .sum()
                        .cast(DataType::UInt64)
                        .alias(name.as_str())
                })
                .collect(),
        )?;
        let sample = table.sample(config.type_sample_rows)?;

        let mut exprs = Vec::with_capacity(text_columns.len());
        let mut logs = Vec::new();
        let mut warnings = Vec::new();
        let mut modified = Vec::new();

        for (name, dtype) in &text_columns {
            let raw = sample.column(name)?.as_materialized_series().cast(&DataType::String)?;
            let values: Vec<String> = raw
                .str()?
                .into_iter()
                .flatten()
                .map(|v| v.trim().to_string())
                .collect();

            let padded = padding
                .column(name)?
                .as_materialized_series()
                .u64()?
                .get(0)
                .unwrap_or(0);
            if padded > 0 {
                logs.push(
                    LogEntry::new(self.name(), StepAction::StripWhitespace)
                        .column(name.as_str())
                        .after(json!({ "padded_values": padded }))
                        .reason("Leading or trailing whitespace found."),
                );
                modified.push(name.clone());
            }

            let coercion = decide_coercion(&values, ctx.role(name), config)?;
            let before = json!({ "dtype": dtype.to_string() });
            match coercion {
                Some(Coercion::Numeric { rate }) => {
                    debug!("Coercing '{}' to Float64 ({:.1}% parsed)", name, rate * 100.0);
                    exprs.push(stripped(name).cast(DataType::Float64).alias(name.as_str()));
                    logs.push(
                        LogEntry::new(self.name(), StepAction::CoerceNumeric)
                            .column(name.as_str())
                            .before(before)
                            .after(json!({ "dtype": "f64", "parse_rate": rate }))
                            .reason(format!(
                                "{:.1}% of sampled values are numeric.",
                                rate * 100.0
                            )),
                    );
                    push_unique(&mut modified, name);
                }
                Some(Coercion::Boolean) => {
                    exprs.push(boolean_expr(name));
                    logs.push(
                        LogEntry::new(self.name(), StepAction::CoerceBoolean)
                            .column(name.as_str())
                            .before(before)
                            .after(json!({ "dtype": "bool" })),
                    );
                    push_unique(&mut modified, name);
                }
                Some(Coercion::Datetime { rate, .. }) if rate == 0.0 => {
                    warn!("Datetime column '{}' did not parse, left as text", name);
                    warnings.push(format!(
                        "Column '{name}' looks like a datetime but no values could be parsed. Left unchanged."
                    ));
                    exprs.push(restore(name, dtype));
                }
                Some(Coercion::Datetime { dtype: target, rate }) => {
                    exprs.push(stripped(name).cast(target.clone()).alias(name.as_str()));
                    logs.push(
                        LogEntry::new(self.name(), StepAction::CoerceDatetime)
                            .column(name.as_str())
                            .before(before)
                            .after(json!({ "dtype": target.to_string(), "parse_rate": rate })),
                    );
                    push_unique(&mut modified, name);
                }
                None => exprs.push(restore(name, dtype)),
            }
        }

        let table = table.with_columns(exprs)?;
        Ok(StepResult::new(table)
            .with_logs(logs)
            .with_warnings(warnings)
            .with_modified(modified))
    }
}

/// Stripped values in the column's original text dtype.
fn restore(name: &str, dtype: &DataType) -> Expr {
    stripped(name).cast(dtype.clone()).alias(name)
}

fn push_unique(columns: &mut Vec<String>, name: &str) {
    if !columns.iter().any(|c| c == name) {
        columns.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{EagerTable, LazyTable};
    use crate::types::ExecutionEngine;
    use pretty_assertions::assert_eq;

    fn strings(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    // ==================== decision tests ====================

    #[test]
    fn test_mostly_numeric_is_coerced() {
        let mut values: Vec<String> = (0..99).map(|i| i.to_string()).collect();
        values.push("unknown".to_string());
        let decision = decide_coercion(&values, Role::FeatureCol, &PipelineConfig::default())
            .unwrap();
        assert_eq!(decision, Some(Coercion::Numeric { rate: 0.99 }));
    }

    #[test]
    fn test_fully_numeric_text_is_left_alone() {
        let values = strings(&["7", "8", "9"]);
        let decision = decide_coercion(&values, Role::FeatureCol, &PipelineConfig::default())
            .unwrap();
        assert_eq!(decision, None);
    }

    #[test]
    fn test_boolean_vocabulary() {
        let config = PipelineConfig::default();
        assert_eq!(
            decide_coercion(&strings(&["Yes", "no", "YES", "null"]), Role::FeatureCol, &config)
                .unwrap(),
            Some(Coercion::Boolean)
        );
        assert_eq!(
            decide_coercion(&strings(&["null", "none"]), Role::FeatureCol, &config).unwrap(),
            None
        );
        assert_eq!(
            decide_coercion(&strings(&["yes", "maybe"]), Role::FeatureCol, &config).unwrap(),
            None
        );
    }

    #[test]
    fn test_datetime_only_for_datetime_role() {
        let config = PipelineConfig::default();
        let values = strings(&["2024-01-01", "2024-02-01"]);
        assert_eq!(
            decide_coercion(&values, Role::FeatureCol, &config).unwrap(),
            None
        );
        match decide_coercion(&values, Role::DatetimeCol, &config).unwrap() {
            Some(Coercion::Datetime { rate, .. }) => assert_eq!(rate, 1.0),
            other => panic!("expected a datetime coercion, got {other:?}"),
        }
    }

    // ==================== step tests ====================

    fn messy() -> DataFrame {
        let mut amount: Vec<String> = (0..39).map(|i| format!(" {i}.5 ")).collect();
        amount.push("n/a".to_string());
        let active: Vec<&str> = (0..40).map(|i| if i % 2 == 0 { "Yes" } else { "no" }).collect();
        let name: Vec<String> = (0..40).map(|i| format!("  person {i}")).collect();
        df![
            "amount" => amount,
            "active" => active,
            "name" => name,
        ]
        .unwrap()
    }

    #[test]
    fn test_step_coerces_and_strips() {
        let mut ctx = PipelineContext::new("ds", ExecutionEngine::InMemory);
        let result = TypeFixer
            .run(Box::new(EagerTable::new(messy(), None)), &mut ctx)
            .unwrap();
        let df = result.table.collect().unwrap();

        assert_eq!(df.column("amount").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("amount").unwrap().null_count(), 1);
        assert_eq!(df.column("active").unwrap().dtype(), &DataType::Boolean);
        let active = df.column("active").unwrap().as_materialized_series().bool().unwrap().clone();
        assert_eq!(active.get(0), Some(true));
        assert_eq!(active.get(1), Some(false));

        let names = df.column("name").unwrap().as_materialized_series().str().unwrap().clone();
        assert_eq!(names.get(0), Some("person 0"));

        let actions: Vec<StepAction> = result.logs.iter().map(|l| l.action).collect();
        assert!(actions.contains(&StepAction::CoerceNumeric));
        assert!(actions.contains(&StepAction::CoerceBoolean));
        assert!(actions.contains(&StepAction::StripWhitespace));
        assert_eq!(result.modified_columns, strings(&["amount", "active", "name"]));
    }

    #[test]
    fn test_padding_outside_the_sample_is_reported() {
        let rows = PipelineConfig::default().type_sample_rows + 500;
        let labels: Vec<String> = (0..rows)
            .map(|i| {
                if i == rows - 1 {
                    "  tail  ".to_string()
                } else {
                    format!("label {}", i % 40)
                }
            })
            .collect();
        let df = df!["label" => labels].unwrap();

        let mut ctx = PipelineContext::new("ds", ExecutionEngine::InMemory);
        let result = TypeFixer
            .run(Box::new(EagerTable::new(df, None)), &mut ctx)
            .unwrap();

        assert_eq!(result.modified_columns, strings(&["label"]));
        let strip = result
            .logs
            .iter()
            .find(|l| l.action == StepAction::StripWhitespace)
            .unwrap();
        assert_eq!(strip.after_value.as_ref().unwrap()["padded_values"], 1);

        let out = result.table.collect().unwrap();
        let labels = out.column("label").unwrap().as_materialized_series().str().unwrap().clone();
        assert_eq!(labels.get(rows - 1), Some("tail"));
    }

    #[test]
    fn test_unparseable_datetime_is_warned_and_kept() {
        let df = df!["when" => ["soon", "later", "never"]].unwrap();
        let mut ctx = PipelineContext::new("ds", ExecutionEngine::InMemory);
        ctx.roles.insert("when".to_string(), Role::DatetimeCol);

        let result = TypeFixer
            .run(Box::new(EagerTable::new(df, None)), &mut ctx)
            .unwrap();

        assert_eq!(result.warnings.len(), 1);
        assert!(result.logs.is_empty());
        let df = result.table.collect().unwrap();
        assert_eq!(df.column("when").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_engines_produce_same_types() {
        let run = |table: Box<dyn Table>| {
            let mut ctx = PipelineContext::new("ds", table.engine());
            let result = TypeFixer.run(table, &mut ctx).unwrap();
            result.table.collect().unwrap()
        };
        let eager = run(Box::new(EagerTable::new(messy(), None)));
        let lazy = run(Box::new(LazyTable::new(messy().lazy()).unwrap()));
        assert!(eager.equals_missing(&lazy));
    }
}
