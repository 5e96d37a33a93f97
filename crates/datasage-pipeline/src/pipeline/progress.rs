//! Progress reporting for pipeline runs.
//!
//! A run moves through a fixed sequence of stages. Each stage maps onto a
//! fixed overall percentage so front ends can render a progress bar without
//! knowing how many columns a dataset has.
//!
//! # Example
//!
//! ```rust,ignore
//! use datasage_pipeline::Pipeline;
//!
//! let processed = Pipeline::builder()
//!     .on_progress(|update| {
//!         println!("[{:>3.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .process_file(&path, &descriptor, ProcessOptions::default())?;
//! ```

use serde::{Deserialize, Serialize};

/// Stages of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Reading the file and choosing an engine
    Loading,
    Normalizing,
    SchemaAnalysis,
    TypeFixing,
    MissingValues,
    Duplicates,
    Outliers,
    EncoderSuggestions,
    /// Materializing the cleaned table and computing the profile
    Summarizing,
    Complete,
    Failed,
}

impl PipelineStage {
    /// Human-readable stage name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Loading => "Loading Dataset",
            Self::Normalizing => "Normalizing Columns",
            Self::SchemaAnalysis => "Analyzing Schema",
            Self::TypeFixing => "Fixing Types",
            Self::MissingValues => "Handling Missing Values",
            Self::Duplicates => "Detecting Duplicates",
            Self::Outliers => "Detecting Outliers",
            Self::EncoderSuggestions => "Suggesting Encoders",
            Self::Summarizing => "Summarizing",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    /// Overall completion reported when the stage starts, in percent.
    pub fn percent(&self) -> u8 {
        match self {
            Self::Loading => 5,
            Self::Normalizing => 10,
            Self::SchemaAnalysis => 20,
            Self::TypeFixing => 35,
            Self::MissingValues => 50,
            Self::Duplicates => 65,
            Self::Outliers => 80,
            Self::EncoderSuggestions => 90,
            Self::Summarizing => 95,
            Self::Complete => 100,
            Self::Failed => 0,
        }
    }
}

/// A single progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: PipelineStage,

    /// Optional detail such as the step or column being processed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    pub message: String,
}

impl ProgressUpdate {
    pub fn new(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            sub_stage: None,
            progress: stage.percent() as f32 / 100.0,
            message: message.into(),
        }
    }

    pub fn with_sub_stage(
        stage: PipelineStage,
        sub_stage: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sub_stage: Some(sub_stage.into()),
            ..Self::new(stage, message)
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::new(PipelineStage::Complete, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(PipelineStage::Failed, message)
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

/// Receives progress updates from a running pipeline.
///
/// Pipelines usually run on a worker thread, so implementations must be
/// `Send + Sync`. `report` is called from inside the run and should return
/// quickly.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// [`ProgressReporter`] backed by a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}
