//! The pipeline orchestrator.
//!
//! [`Pipeline`] runs the preprocessing steps in order over one table, and
//! [`Pipeline::process_file`] wraps that in the full load, run, materialize
//! and summarize sequence.

use crate::config::{ConfigValidationError, PipelineConfig};
use crate::domain::{DEFAULT_DOMAIN, DomainRegistry};
use crate::error::Result;
use crate::loader::{DatasetLoader, FormatDescriptor, LoadOptions};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::progress::{
    ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use crate::pipeline::step::PipelineStep;
use crate::profiler::Summarizer;
use crate::steps;
use crate::table::Table;
use crate::types::{DatasetProfile, ExecutionEngine, LogEntry};
use polars::prelude::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

const RETRY_WARNING: &str =
    "Memory limit exceeded during processing. Retried the run with the partitioned engine.";

/// The table left by the steps plus their audit log.
pub struct PipelineOutcome {
    pub table: Box<dyn Table>,
    pub logs: Vec<LogEntry>,
}

/// Everything a caller persists after a run.
#[derive(Debug, Clone)]
pub struct ProcessedDataset {
    pub cleaned: DataFrame,
    pub logs: Vec<LogEntry>,
    pub profile: DatasetProfile,
    pub warnings: Vec<String>,
    pub engine: ExecutionEngine,
}

/// Per-file run options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOptions {
    /// Domain tag; empty means `general`.
    pub domain: String,
    pub job_id: Option<String>,
    pub force_engine: Option<ExecutionEngine>,
}

impl ProcessOptions {
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn force_engine(mut self, engine: ExecutionEngine) -> Self {
        self.force_engine = Some(engine);
        self
    }
}

/// The preprocessing pipeline.
///
/// Use [`Pipeline::builder()`] to create one.
///
/// # Example
///
/// ```rust,ignore
/// use datasage_pipeline::{FileFormat, FormatDescriptor, Pipeline, ProcessOptions};
///
/// let processed = Pipeline::builder()
///     .on_progress(|update| println!("{}", update.message))
///     .build()?
///     .process_file(
///         Path::new("patients.csv"),
///         &FormatDescriptor::new(FileFormat::Csv),
///         ProcessOptions::default().domain("healthcare"),
///     )?;
///
/// println!("quality: {}", processed.profile.dataset_quality_score);
/// ```
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    registry: Arc<DomainRegistry>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    steps: Vec<Box<dyn PipelineStep>>,
}

// runs are usually moved onto a worker thread
static_assertions::assert_impl_all!(Pipeline: Send);

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Names of the configured steps, in run order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// A fresh context wired to this pipeline's config and registry.
    pub fn context(
        &self,
        dataset_id: impl Into<String>,
        domain: &str,
        engine: ExecutionEngine,
    ) -> PipelineContext {
        let domain = if domain.trim().is_empty() {
            DEFAULT_DOMAIN
        } else {
            domain
        };
        PipelineContext::new(dataset_id, engine)
            .with_domain(domain)
            .with_config(self.config.clone())
            .with_registry(self.registry.clone())
    }

    /// Run every step over `table`.
    ///
    /// Step warnings are appended to `ctx.warnings`. Any step error aborts
    /// the run as [`PipelineError::StepFailed`](crate::error::PipelineError::StepFailed),
    /// except resource exhaustion, which is passed through unchanged.
    pub fn run(&self, table: Box<dyn Table>, ctx: &mut PipelineContext) -> Result<PipelineOutcome> {
        let mut table = table;
        let mut logs = Vec::new();

        for step in &self.steps {
            self.report_progress(ProgressUpdate::with_sub_stage(
                step.stage(),
                step.name(),
                format!("{}...", step.stage().display_name()),
            ));

            let started = Instant::now();
            info!("Running {}", step.name());
            let result = step.run(table, ctx).map_err(|e| e.in_step(step.name()))?;

            debug!(
                "{} finished in {:?}: {} log entries, modified {:?}",
                step.name(),
                started.elapsed(),
                result.logs.len(),
                result.modified_columns
            );
            for message in &result.warnings {
                warn!("{}", message);
            }

            table = result.table;
            logs.extend(result.logs);
            ctx.warnings.extend(result.warnings);
        }

        Ok(PipelineOutcome { table, logs })
    }

    /// Load, run, materialize and summarize one file.
    ///
    /// A run that hits the memory budget on the in-memory engine is retried
    /// once from the start with the partitioned engine.
    pub fn process_file(
        &self,
        path: &Path,
        descriptor: &FormatDescriptor,
        options: ProcessOptions,
    ) -> Result<ProcessedDataset> {
        let outcome = match self.process_internal(path, descriptor, &options) {
            Err(e)
                if e.is_resource_exhausted()
                    && options.force_engine != Some(ExecutionEngine::Partitioned) =>
            {
                warn!("{}. Retrying with the partitioned engine", e);
                let retry = options.clone().force_engine(ExecutionEngine::Partitioned);
                self.process_internal(path, descriptor, &retry)
                    .map(|mut processed| {
                        processed.warnings.insert(0, RETRY_WARNING.to_string());
                        processed
                    })
            }
            other => other,
        };

        match outcome {
            Ok(processed) => {
                self.report_progress(ProgressUpdate::complete("Pipeline completed successfully"));
                Ok(processed)
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    fn process_internal(
        &self,
        path: &Path,
        descriptor: &FormatDescriptor,
        options: &ProcessOptions,
    ) -> Result<ProcessedDataset> {
        let started = Instant::now();
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Loading,
            format!("Loading {}", path.display()),
        ));

        let load_options = LoadOptions {
            force_engine: options.force_engine,
        };
        let loaded = DatasetLoader::new((*self.config).clone()).load(path, descriptor, load_options)?;

        let dataset_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        let mut ctx = self.context(dataset_id, &options.domain, loaded.execution_engine);
        if let Some(job_id) = &options.job_id {
            ctx = ctx.with_job_id(job_id.clone());
        }
        ctx.warnings.extend(loaded.warnings);

        let outcome = self.run(loaded.table, &mut ctx)?;

        self.report_progress(ProgressUpdate::new(
            PipelineStage::Summarizing,
            "Computing dataset profile...",
        ));
        let cleaned = outcome.table.collect()?;
        let profile = Summarizer::new(&self.config).summarize(&cleaned, &ctx)?;

        info!(
            "Processed {} ({} rows x {} columns) in {:?} on the {} engine, quality {}",
            ctx.dataset_id,
            cleaned.height(),
            cleaned.width(),
            started.elapsed(),
            ctx.engine,
            profile.dataset_quality_score
        );

        Ok(ProcessedDataset {
            cleaned,
            logs: outcome.logs,
            profile,
            warnings: ctx.warnings,
            engine: ctx.engine,
        })
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    registry: Option<Arc<DomainRegistry>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    steps: Option<Vec<Box<dyn PipelineStep>>>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a custom domain registry instead of the built-in domains.
    pub fn registry(mut self, registry: DomainRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Replace the default step chain.
    pub fn steps(mut self, steps: Vec<Box<dyn PipelineStep>>) -> Self {
        self.steps = Some(steps);
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<Pipeline, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(Pipeline {
            config: Arc::new(config),
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(DomainRegistry::builtin())),
            progress_reporter: self.progress_reporter,
            steps: self.steps.unwrap_or_else(steps::default_steps),
        })
    }
}
