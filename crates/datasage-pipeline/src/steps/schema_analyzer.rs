//! Column role inference.
//!
//! Every column gets exactly one [`Role`]. The first matching rule wins:
//!
//! 1. a role declared for the column by the dataset's domain profile
//! 2. a single unique value makes it a constant
//! 3. near-unique values with an id-like name or an integer dtype make it an identifier
//! 4. text columns become datetimes, free text or features depending on what they hold
//! 5. native temporal dtypes are datetimes
//! 6. everything else is a feature
//!
//! All decisions are made on a bounded sample, so the partitioned engine
//! never materializes the table here.

use crate::config::PipelineConfig;
use crate::domain::DomainProfile;
use crate::error::Result;
use crate::pipeline::{PipelineContext, PipelineStage, PipelineStep, StepResult};
use crate::table::Table;
use crate::types::{LogEntry, Role, StepAction};
use crate::utils::{
    has_id_token, is_datetime_dtype, is_integer_dtype, is_text_dtype, temporal_parse, text_values,
};
use polars::prelude::*;
use serde_json::json;
use tracing::debug;

const SOURCE_DOMAIN: &str = "domain_profile";
const SOURCE_HEURISTIC: &str = "heuristic";

/// Outcome of inferring one column's role.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleDecision {
    pub role: Role,
    /// `domain_profile` or `heuristic`.
    pub source: &'static str,
    pub warning: Option<String>,
}

impl RoleDecision {
    fn heuristic(role: Role) -> Self {
        Self {
            role,
            source: SOURCE_HEURISTIC,
            warning: None,
        }
    }
}

/// Infer the role of one sampled column.
pub fn infer_role(
    series: &Series,
    domain: &DomainProfile,
    config: &PipelineConfig,
) -> Result<RoleDecision> {
    let name = series.name().as_str();

    if let Some(role) = domain.known_role(name) {
        return Ok(RoleDecision {
            role,
            source: SOURCE_DOMAIN,
            warning: None,
        });
    }

    let non_null = series.drop_nulls();
    let unique = non_null.n_unique()?;
    if unique == 1 {
        return Ok(RoleDecision {
            role: Role::ConstantCol,
            source: SOURCE_HEURISTIC,
            warning: Some(format!(
                "Column '{name}' has only one unique value. Safe to drop."
            )),
        });
    }

    let dtype = series.dtype();
    if !series.is_empty() {
        let uniqueness = unique as f64 / series.len() as f64;
        if uniqueness > config.id_uniqueness_ratio && (has_id_token(name) || is_integer_dtype(dtype))
        {
            return Ok(RoleDecision::heuristic(Role::IdCol));
        }
    }

    if is_text_dtype(dtype) {
        if non_null.is_empty() {
            return Ok(RoleDecision::heuristic(Role::FeatureCol));
        }
        let parsed = temporal_parse(&non_null)?;
        if parsed.rate >= config.datetime_parse_ratio {
            return Ok(RoleDecision::heuristic(Role::DatetimeCol));
        }
        let values = text_values(&non_null, non_null.len())?;
        let mean_length =
            values.iter().map(|v| v.chars().count()).sum::<usize>() as f64 / values.len() as f64;
        if mean_length > config.text_mean_length {
            return Ok(RoleDecision::heuristic(Role::TextCol));
        }
        return Ok(RoleDecision::heuristic(Role::FeatureCol));
    }

    if is_datetime_dtype(dtype) {
        return Ok(RoleDecision::heuristic(Role::DatetimeCol));
    }

    Ok(RoleDecision::heuristic(Role::FeatureCol))
}

/// Assigns a role to every column and records it in the context.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaAnalyzer;

impl PipelineStep for SchemaAnalyzer {
    fn name(&self) -> &'static str {
        "SchemaAnalyzer"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::SchemaAnalysis
    }

    fn run(&self, table: Box<dyn Table>, ctx: &mut PipelineContext) -> Result<StepResult> {
        let sample = table.sample(ctx.config().schema_sample_rows)?;

        let mut decisions = Vec::with_capacity(sample.width());
        for column in sample.get_columns() {
            let series = column.as_materialized_series();
            let decision = infer_role(series, ctx.domain_profile(), ctx.config())?;
            debug!(
                "Role for '{}': {} ({})",
                series.name(),
                decision.role,
                decision.source
            );
            decisions.push((series.name().to_string(), decision));
        }

        let mut logs = Vec::with_capacity(decisions.len());
        let mut warnings = Vec::new();
        for (name, decision) in decisions {
            logs.push(
                LogEntry::new(self.name(), StepAction::RoleAssignment)
                    .column(name.as_str())
                    .after(json!({ "role": decision.role, "source": decision.source })),
            );
            warnings.extend(decision.warning);
            ctx.roles.insert(name, decision.role);
        }

        Ok(StepResult::new(table)
            .with_logs(logs)
            .with_warnings(warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainRegistry;
    use crate::table::{EagerTable, LazyTable};
    use crate::types::ExecutionEngine;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn frame() -> DataFrame {
        let long_text: Vec<String> = (0..6)
            .map(|i| format!("Incident report number {i} describing what went wrong in detail, at length."))
            .collect();
        df![
            "user_id" => ["u1", "u2", "u3", "u4", "u5", "u6"],
            "row_num" => [1i64, 2, 3, 4, 5, 6],
            "signup" => ["2024-01-15", "2024-02-01", "2024-02-20", "2024-03-05", "2024-03-30", "2024-04-11"],
            "notes" => long_text,
            "city" => ["Oslo", "Rome", "Oslo", "Lima", "Rome", "Oslo"],
            "country" => ["NO", "NO", "NO", "NO", "NO", "NO"],
            "score" => [1.5, 2.5, 1.5, 3.0, 2.0, 1.0],
        ]
        .unwrap()
    }

    fn roles_for(table: Box<dyn Table>, domain: &str) -> (BTreeMap<String, Role>, StepResult) {
        let mut ctx = PipelineContext::new("ds", table.engine()).with_domain(domain);
        let result = SchemaAnalyzer.run(table, &mut ctx).unwrap();
        (ctx.roles, result)
    }

    #[test]
    fn test_heuristic_roles() {
        let (roles, result) = roles_for(Box::new(EagerTable::new(frame(), None)), "general");

        assert_eq!(roles["user_id"], Role::IdCol);
        assert_eq!(roles["row_num"], Role::IdCol);
        assert_eq!(roles["signup"], Role::DatetimeCol);
        assert_eq!(roles["notes"], Role::TextCol);
        assert_eq!(roles["city"], Role::FeatureCol);
        assert_eq!(roles["country"], Role::ConstantCol);
        assert_eq!(roles["score"], Role::FeatureCol);

        assert_eq!(
            result.warnings,
            vec!["Column 'country' has only one unique value. Safe to drop.".to_string()]
        );
        assert_eq!(result.logs.len(), 7);
        assert!(result.modified_columns.is_empty());
    }

    #[test]
    fn test_domain_profile_overrides_heuristics() {
        let registry = DomainRegistry::from_json(
            r#"{"crm": {"display_name": "CRM", "known_columns": {"country": {"role": "target"}}}}"#,
        )
        .unwrap();
        let mut ctx = PipelineContext::new("ds", ExecutionEngine::InMemory)
            .with_domain("crm")
            .with_registry(std::sync::Arc::new(registry));

        let result = SchemaAnalyzer
            .run(Box::new(EagerTable::new(frame(), None)), &mut ctx)
            .unwrap();

        assert_eq!(ctx.role("country"), Role::TargetCol);
        assert!(result.warnings.is_empty());
        let country_log = result
            .logs
            .iter()
            .find(|l| l.column_name.as_deref() == Some("country"))
            .unwrap();
        assert_eq!(country_log.after_str("source"), Some("domain_profile"));
        assert_eq!(country_log.after_str("role"), Some("target_col"));
    }

    #[test]
    fn test_native_datetime_dtype() {
        let dates = Series::new("when".into(), ["2024-01-01", "2024-01-02", "2024-01-02"])
            .cast(&DataType::Date)
            .unwrap();
        let decision =
            infer_role(&dates, DomainRegistry::builtin().get("general"), &PipelineConfig::default())
                .unwrap();
        assert_eq!(decision.role, Role::DatetimeCol);
    }

    #[test]
    fn test_float_uniques_are_not_ids() {
        let values = Series::new("reading".into(), [0.1, 0.2, 0.3, 0.4]);
        let decision =
            infer_role(&values, DomainRegistry::builtin().get("general"), &PipelineConfig::default())
                .unwrap();
        assert_eq!(decision.role, Role::FeatureCol);
    }

    #[test]
    fn test_engines_agree() {
        let (eager, _) = roles_for(Box::new(EagerTable::new(frame(), None)), "general");
        let (lazy, _) = roles_for(Box::new(LazyTable::new(frame().lazy()).unwrap()), "general");
        assert_eq!(eager, lazy);
    }

    #[test]
    fn test_engines_agree_beyond_sample_size() {
        let rows = PipelineConfig::default().schema_sample_rows * 2;
        // constant inside the sampled prefix, varied after it
        let flag: Vec<i64> = (0..rows)
            .map(|i| if i < rows / 2 { 1 } else { (i % 7) as i64 })
            .collect();
        let value: Vec<f64> = (0..rows).map(|i| (i % 13) as f64 * 0.5).collect();
        let big = df!["flag" => flag, "value" => value].unwrap();

        let (eager, _) = roles_for(Box::new(EagerTable::new(big.clone(), None)), "general");
        let (lazy, _) = roles_for(Box::new(LazyTable::new(big.lazy()).unwrap()), "general");
        assert_eq!(eager, lazy);
        assert_eq!(eager["flag"], Role::ConstantCol);
    }
}
