//! Exact duplicate row detection.
//!
//! Duplicates are counted and reported, never removed. The check needs the
//! whole table in memory, so it is skipped (and logged as skipped) on the
//! partitioned engine.

use crate::error::Result;
use crate::pipeline::{PipelineContext, PipelineStage, PipelineStep, StepResult};
use crate::table::Table;
use crate::types::{LogEntry, Severity, StepAction};
use polars::prelude::*;
use serde_json::json;
use tracing::debug;

/// Number of rows that repeat an earlier row exactly.
pub fn count_duplicates(df: &DataFrame) -> Result<usize> {
    let unique = df.unique::<&str, &str>(None, UniqueKeepStrategy::First, None)?;
    Ok(df.height() - unique.height())
}

/// Reports exact duplicate rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateDetector;

impl PipelineStep for DuplicateDetector {
    fn name(&self) -> &'static str {
        "DuplicateDetector"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::Duplicates
    }

    fn run(&self, table: Box<dyn Table>, _ctx: &mut PipelineContext) -> Result<StepResult> {
        let Some(df) = table.materialized() else {
            debug!("Skipping duplicate check on a partitioned table");
            let log = LogEntry::new(self.name(), StepAction::SkipDuplicateCheck)
                .reason("Exact duplicate detection needs the full table in memory.");
            return Ok(StepResult::new(table).with_logs(vec![log]));
        };

        let count = count_duplicates(df)?;
        if count == 0 {
            return Ok(StepResult::new(table));
        }

        let pct = count as f64 / df.height() as f64;
        let warning = format!(
            "Found {} exact duplicate rows ({:.2}%).",
            count,
            pct * 100.0
        );
        let log = LogEntry::new(self.name(), StepAction::FlagDuplicates)
            .after(json!({ "count": count, "pct": pct }))
            .severity(Severity::Warning);

        Ok(StepResult::new(table)
            .with_logs(vec![log])
            .with_warnings(vec![warning]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{EagerTable, LazyTable};
    use crate::types::ExecutionEngine;
    use pretty_assertions::assert_eq;

    fn frame() -> DataFrame {
        df![
            "a" => [1i64, 2, 1, 3, 1],
            "b" => [Some("x"), Some("y"), Some("x"), None, Some("x")],
        ]
        .unwrap()
    }

    #[test]
    fn test_count_duplicates() {
        assert_eq!(count_duplicates(&frame()).unwrap(), 2);
        assert_eq!(count_duplicates(&df!["a" => [1i64, 2]].unwrap()).unwrap(), 0);
    }

    #[test]
    fn test_flags_without_removing() {
        let mut ctx = PipelineContext::new("ds", ExecutionEngine::InMemory);
        let result = DuplicateDetector
            .run(Box::new(EagerTable::new(frame(), None)), &mut ctx)
            .unwrap();

        assert_eq!(result.warnings, vec!["Found 2 exact duplicate rows (40.00%).".to_string()]);
        assert_eq!(result.logs[0].action, StepAction::FlagDuplicates);
        assert_eq!(result.logs[0].severity, Severity::Warning);
        assert_eq!(result.table.height(), 5);
    }

    #[test]
    fn test_partitioned_table_is_skipped() {
        let mut ctx = PipelineContext::new("ds", ExecutionEngine::Partitioned);
        let result = DuplicateDetector
            .run(Box::new(LazyTable::new(frame().lazy()).unwrap()), &mut ctx)
            .unwrap();

        assert!(result.warnings.is_empty());
        assert_eq!(result.logs.len(), 1);
        assert_eq!(result.logs[0].action, StepAction::SkipDuplicateCheck);
    }
}
