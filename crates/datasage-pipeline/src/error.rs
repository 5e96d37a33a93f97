//! Error types for loading, preprocessing and profiling.
//!
//! Load-time failures come in two flavours that callers must be able to tell
//! apart: a [`PipelineError::LoadFailed`] means the bytes could not be read at
//! all, while a [`PipelineError::ValidationFailed`] means they were read but
//! described a degenerate dataset (no columns, no rows).
//!
//! Errors are serializable so they can be handed to API layers unchanged.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Corrupt or unreadable input. Never retried.
    #[error("Corrupted file or load failure: {0}")]
    LoadFailed(String),

    /// Input was readable but structurally empty or degenerate.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// The detected format has no reader in this build.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Memory pressure while working on an in-memory table.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A preprocessing step raised an error; the whole run is aborted.
    #[error("Pipeline step {step} failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Zip archive error.
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Wrap any error raised inside a step into a fatal [`PipelineError::StepFailed`].
    ///
    /// Resource exhaustion passes through untouched so the orchestrator can
    /// still recognise it and retry on the partitioned engine.
    pub fn in_step(self, step: &str) -> Self {
        if self.is_resource_exhausted() || matches!(self, Self::StepFailed { .. }) {
            return self;
        }
        PipelineError::StepFailed {
            step: step.to_string(),
            reason: self.to_string(),
        }
    }

    /// Get a stable error code for API consumers.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::LoadFailed(_) => "LOAD_FAILED",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            Self::StepFailed { .. } => "STEP_FAILED",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Zip(_) => "ARCHIVE_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    fn root(&self) -> &PipelineError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Corrupt/unreadable input (including unsupported formats).
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self.root(),
            Self::LoadFailed(_) | Self::UnsupportedFormat(_)
        )
    }

    /// Structurally empty input.
    pub fn is_validation_failure(&self) -> bool {
        matches!(self.root(), Self::ValidationFailed(_))
    }

    /// Transient memory pressure; the run may be retried on the partitioned engine.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self.root(), Self::ResourceExhausted(_))
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PipelineError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(
            PipelineError::LoadFailed("bad".to_string()).error_code(),
            "LOAD_FAILED"
        );
        assert_eq!(
            PipelineError::ValidationFailed("empty".to_string()).error_code(),
            "VALIDATION_FAILED"
        );
    }

    #[test]
    fn test_load_and_validation_are_distinct() {
        let load = PipelineError::LoadFailed("truncated parquet footer".to_string());
        let validation = PipelineError::ValidationFailed("File contains no rows.".to_string());

        assert!(load.is_load_failure());
        assert!(!load.is_validation_failure());
        assert!(validation.is_validation_failure());
        assert!(!validation.is_load_failure());
    }

    #[test]
    fn test_predicates_see_through_context() {
        let error = PipelineError::ResourceExhausted("budget".to_string())
            .with_context("While loading");
        assert!(error.is_resource_exhausted());
        assert_eq!(error.error_code(), "RESOURCE_EXHAUSTED");
    }

    #[test]
    fn test_in_step_wraps_but_keeps_resource_exhaustion() {
        let wrapped = PipelineError::ColumnNotFound("age".to_string()).in_step("TypeFixer");
        assert!(matches!(wrapped, PipelineError::StepFailed { .. }));
        assert!(wrapped.to_string().starts_with("Pipeline step TypeFixer failed"));

        let exhausted = PipelineError::ResourceExhausted("x".to_string()).in_step("TypeFixer");
        assert!(exhausted.is_resource_exhausted());
    }

    #[test]
    fn test_error_serialization() {
        let error = PipelineError::ColumnNotFound("age".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("COLUMN_NOT_FOUND"));
        assert!(json.contains("age"));
    }

    #[test]
    fn test_with_context() {
        let error =
            PipelineError::ColumnNotFound("test".to_string()).with_context("During profiling");
        assert!(error.to_string().contains("During profiling"));
        assert_eq!(error.error_code(), "COLUMN_NOT_FOUND");
    }
}
