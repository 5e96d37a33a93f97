//! DataSage Pipeline Library
//!
//! Size-aware dataset loading, preprocessing and statistical profiling built
//! on Polars.
//!
//! # Overview
//!
//! A run takes one file through four phases:
//!
//! - **Loading**: format sniffing, archive and workbook normalisation, a
//!   dtype pre-pass, and a size-based choice between an in-memory and a
//!   partitioned (lazy) execution engine
//! - **Preprocessing**: seven steps run in order over a [`table::Table`]:
//!   column normalization, schema analysis, type fixing, missing values,
//!   duplicates, outliers and encoder suggestions
//! - **Profiling**: the [`profiler::Summarizer`] computes a [`DatasetProfile`]
//!   with per-column statistics, correlations and a quality score
//! - **Reporting**: a compressed profile for LLM agents and a narrative of
//!   every logged change
//!
//! Steps annotate rather than destroy: rows are never dropped, outliers are
//! counted but kept, and every decision lands in an ordered audit log.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use datasage_pipeline::{FormatDescriptor, Pipeline, ProcessOptions};
//! use std::path::Path;
//!
//! let path = Path::new("patients.csv");
//! let pipeline = Pipeline::builder()
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?;
//!
//! let processed = pipeline.process_file(
//!     path,
//!     &FormatDescriptor::sniff(path)?,
//!     ProcessOptions::default().domain("healthcare"),
//! )?;
//!
//! println!("quality: {}", processed.profile.dataset_quality_score);
//! ```
//!
//! # Configuration
//!
//! Every threshold lives in [`PipelineConfig`]:
//!
//! ```rust,ignore
//! use datasage_pipeline::PipelineConfig;
//!
//! let config = PipelineConfig::builder()
//!     .missing_indicator_threshold(0.05)
//!     .missing_impute_max(0.30)
//!     .zscore_threshold(3.5)
//!     .build()?;
//! ```
//!
//! # Domains
//!
//! A domain tag selects column-role overrides and outlier sanity rules from
//! a [`DomainRegistry`]. The built-in registry covers general, healthcare,
//! finance, education, ecommerce, ai_incidents and other; custom registries
//! can be parsed from JSON with [`DomainRegistry::from_json`].

pub mod config;
pub mod domain;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod profiler;
pub mod quality;
pub mod reporting;
pub mod steps;
pub mod table;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use config::{ConfigValidationError, PipelineConfig, PipelineConfigBuilder};
pub use domain::{DomainProfile, DomainRegistry};
pub use error::{PipelineError, Result as PipelineResult, ResultExt};
pub use loader::{DatasetLoader, FileFormat, FormatDescriptor, LoadOptions, LoadedDataset};
pub use pipeline::{
    ClosureProgressReporter, Pipeline, PipelineBuilder, PipelineContext, PipelineOutcome,
    PipelineStage, PipelineStep, ProcessOptions, ProcessedDataset, ProgressReporter,
    ProgressUpdate, StepResult,
};
pub use profiler::Summarizer;
pub use quality::{QualityLabel, quality_score};
pub use reporting::{CompressedProfile, compress_for_agents, describe_change, processing_narrative};
pub use table::{EagerTable, LazyTable, Table};
pub use types::{
    ColumnProfile, DatasetProfile, DistributionType, ExecutionEngine, HighCorrelation, LogEntry,
    Role, Severity, StepAction,
};
