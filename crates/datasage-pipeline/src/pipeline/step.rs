//! The preprocessing step interface.

use crate::error::Result;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::progress::PipelineStage;
use crate::table::Table;
use crate::types::LogEntry;

/// What a step hands back to the orchestrator.
///
/// `modified_columns` lists every column whose values or dtype the step
/// changed, plus any column it added or renamed. Columns not listed are
/// left exactly as the step received them.
pub struct StepResult {
    pub table: Box<dyn Table>,
    pub logs: Vec<LogEntry>,
    pub warnings: Vec<String>,
    pub modified_columns: Vec<String>,
}

impl StepResult {
    /// A result with no logs, warnings or modified columns yet.
    pub fn new(table: Box<dyn Table>) -> Self {
        Self {
            table,
            logs: Vec::new(),
            warnings: Vec::new(),
            modified_columns: Vec::new(),
        }
    }

    pub fn with_logs(mut self, logs: Vec<LogEntry>) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_modified(mut self, columns: Vec<String>) -> Self {
        self.modified_columns = columns;
        self
    }
}

impl std::fmt::Debug for StepResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepResult")
            .field("engine", &self.table.engine())
            .field("logs", &self.logs.len())
            .field("warnings", &self.warnings)
            .field("modified_columns", &self.modified_columns)
            .finish()
    }
}

/// One stage of the preprocessing chain.
///
/// A step reads and replaces the table, may update the context's role map,
/// and reports what it did. Steps only talk to the [`Table`] interface, so
/// the same step runs unchanged on either engine.
pub trait PipelineStep: Send + Sync {
    /// Name used in log entries and errors.
    fn name(&self) -> &'static str;

    /// Progress stage reported while the step runs.
    fn stage(&self) -> PipelineStage;

    fn run(&self, table: Box<dyn Table>, ctx: &mut PipelineContext) -> Result<StepResult>;
}
