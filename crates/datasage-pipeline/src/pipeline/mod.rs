//! Pipeline module.
//!
//! The context, the step interface, progress reporting and the orchestrator
//! that runs the steps over a loaded table.

mod builder;
pub mod context;
pub mod progress;
pub mod step;

pub use builder::{Pipeline, PipelineBuilder, PipelineOutcome, ProcessOptions, ProcessedDataset};
pub use context::PipelineContext;
pub use progress::{ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate};
pub use step::{PipelineStep, StepResult};
