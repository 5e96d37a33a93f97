//! The preprocessing steps, one per file.
//!
//! [`default_steps`] returns them in the order the pipeline runs them. Each
//! step only reads what the previous ones left behind: names are normalized
//! before roles are inferred, roles before types are fixed, and types before
//! nulls are counted.

mod duplicate_detector;
mod encoder_suggester;
mod missing_handler;
mod normalizer;
mod outlier_detector;
mod schema_analyzer;
mod type_fixer;

pub use duplicate_detector::{DuplicateDetector, count_duplicates};
pub use encoder_suggester::{Encoder, EncoderSuggester};
pub use missing_handler::{INDICATOR_SUFFIX, MissingValueHandler};
pub use normalizer::{ColumnNormalizer, normalize_column_name, normalize_column_names};
pub use outlier_detector::{OutlierDetector, OutlierFinding, OutlierMethod, detect_outliers};
pub use schema_analyzer::{RoleDecision, SchemaAnalyzer, infer_role};
pub use type_fixer::{Coercion, TypeFixer, decide_coercion};

use crate::pipeline::PipelineStep;

/// The seven steps in execution order.
pub fn default_steps() -> Vec<Box<dyn PipelineStep>> {
    vec![
        Box::new(ColumnNormalizer),
        Box::new(SchemaAnalyzer),
        Box::new(TypeFixer),
        Box::new(MissingValueHandler),
        Box::new(DuplicateDetector),
        Box::new(OutlierDetector),
        Box::new(EncoderSuggester),
    ]
}
