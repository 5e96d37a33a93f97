//! Encoding suggestions for downstream modelling.

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::{PipelineContext, PipelineStage, PipelineStep, StepResult};
use crate::table::Table;
use crate::types::{LogEntry, Role, StepAction};
use crate::utils::is_text_dtype;
use polars::prelude::*;
use serde_json::json;
use std::fmt;

/// A suggested encoding strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoder {
    DatetimeFeatures,
    TfidfOrEmbedding,
    OneHot,
    Ordinal,
    FrequencyOrTarget,
}

impl Encoder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DatetimeFeatures => "datetime_features",
            Self::TfidfOrEmbedding => "tfidf_or_embedding",
            Self::OneHot => "one_hot",
            Self::Ordinal => "ordinal",
            Self::FrequencyOrTarget => "frequency_or_target",
        }
    }

    /// Pick an encoder from a column's role, dtype and distinct value count.
    ///
    /// Cardinality rules only cover discrete columns (text, categorical or
    /// boolean). Returns `None` for roles that are never encoded and for
    /// continuous numeric features.
    pub fn suggest(
        role: Role,
        dtype: &DataType,
        unique_count: usize,
        config: &PipelineConfig,
    ) -> Option<Self> {
        match role {
            Role::IdCol | Role::ConstantCol | Role::TargetCol => None,
            Role::DatetimeCol => Some(Self::DatetimeFeatures),
            Role::TextCol => Some(Self::TfidfOrEmbedding),
            Role::FeatureCol if !is_discrete(dtype) => None,
            Role::FeatureCol if unique_count <= config.one_hot_max_uniques => Some(Self::OneHot),
            Role::FeatureCol if unique_count <= config.ordinal_max_uniques => Some(Self::Ordinal),
            Role::FeatureCol => Some(Self::FrequencyOrTarget),
        }
    }
}

fn is_discrete(dtype: &DataType) -> bool {
    is_text_dtype(dtype) || dtype == &DataType::Boolean
}

impl fmt::Display for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logs an encoder suggestion per encodable column. Never changes the table.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncoderSuggester;

impl PipelineStep for EncoderSuggester {
    fn name(&self) -> &'static str {
        "EncoderSuggester"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::EncoderSuggestions
    }

    fn run(&self, table: Box<dyn Table>, ctx: &mut PipelineContext) -> Result<StepResult> {
        let columns: Vec<(String, DataType)> = table
            .schema()?
            .into_iter()
            .filter(|(name, _)| {
                !matches!(
                    ctx.role(name),
                    Role::IdCol | Role::ConstantCol | Role::TargetCol
                )
            })
            .collect();
        if columns.is_empty() {
            return Ok(StepResult::new(table));
        }

        let counts = table.aggregate(
            columns
                .iter()
                .map(|(name, _)| {
                    col(name.as_str())
                        .drop_nulls()
                        .n_unique()
                        .cast(DataType::UInt64)
                        .alias(name.as_str())
                })
                .collect(),
        )?;

        let mut logs = Vec::with_capacity(columns.len());
        for (name, dtype) in &columns {
            let unique_count = counts
                .column(name)?
                .as_materialized_series()
                .u64()?
                .get(0)
                .unwrap_or(0) as usize;
            if let Some(encoder) = Encoder::suggest(ctx.role(name), dtype, unique_count, ctx.config()) {
                logs.push(
                    LogEntry::new(self.name(), StepAction::SuggestEncoder)
                        .column(name.as_str())
                        .after(json!({ "encoder": encoder.as_str(), "unique_count": unique_count })),
                );
            }
        }

        Ok(StepResult::new(table).with_logs(logs))
    }
}
