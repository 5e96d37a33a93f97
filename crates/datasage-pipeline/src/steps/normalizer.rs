//! Column name normalization.

use crate::error::Result;
use crate::pipeline::{PipelineContext, PipelineStage, PipelineStep, StepResult};
use crate::table::Table;
use crate::types::{LogEntry, StepAction};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

static NON_ALNUM_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("Invalid regex: non-alphanumeric run"));

/// Name used when nothing alphanumeric survives normalization.
const EMPTY_NAME: &str = "column";

/// Normalize a single column name, without collision handling.
///
/// Lowercases, replaces each run of non-alphanumeric characters with one
/// underscore, trims underscores at both ends and prefixes a leading digit
/// with `col_`.
pub fn normalize_column_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let replaced = NON_ALNUM_RUN.replace_all(&lower, "_");
    let trimmed = replaced.trim_matches('_');

    if trimmed.is_empty() {
        EMPTY_NAME.to_string()
    } else if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        format!("col_{trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Normalize a full header, appending `_1`, `_2`, ... on collisions.
pub fn normalize_column_names(names: &[String]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::with_capacity(names.len());
    names
        .iter()
        .map(|name| {
            let base = normalize_column_name(name);
            let mut candidate = base.clone();
            let mut suffix = 1;
            while taken.contains(&candidate) {
                candidate = format!("{base}_{suffix}");
                suffix += 1;
            }
            taken.insert(candidate.clone());
            candidate
        })
        .collect()
}

/// Renames every column to a lowercase snake_case identifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnNormalizer;

impl PipelineStep for ColumnNormalizer {
    fn name(&self) -> &'static str {
        "ColumnNormalizer"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::Normalizing
    }

    fn run(&self, table: Box<dyn Table>, ctx: &mut PipelineContext) -> Result<StepResult> {
        let names = table.column_names()?;
        let normalized = normalize_column_names(&names);

        let renames: Vec<(&String, &String)> = names
            .iter()
            .zip(&normalized)
            .filter(|(old, new)| old != new)
            .collect();
        if renames.is_empty() {
            return Ok(StepResult::new(table));
        }

        let roles: BTreeMap<String, _> = names
            .iter()
            .zip(&normalized)
            .filter_map(|(old, new)| ctx.roles.get(old).map(|role| (new.clone(), *role)))
            .collect();
        ctx.roles = roles;

        let mut logs = Vec::with_capacity(renames.len());
        for (old, new) in &renames {
            debug!("Renaming '{}' to '{}'", old, new);
            logs.push(
                LogEntry::new(self.name(), StepAction::RenameColumn)
                    .column(new.as_str())
                    .before(json!({ "name": old }))
                    .after(json!({ "new_name": new })),
            );
        }
        let modified = renames.iter().map(|(_, new)| (*new).clone()).collect();

        let exprs = names
            .iter()
            .zip(&normalized)
            .map(|(old, new)| col(old.as_str()).alias(new.as_str()))
            .collect();
        let table = table.select(exprs)?;

        Ok(StepResult::new(table)
            .with_logs(logs)
            .with_modified(modified))
    }
}
