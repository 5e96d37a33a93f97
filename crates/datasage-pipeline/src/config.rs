//! Configuration types for the preprocessing pipeline.
//!
//! Every threshold the loader, the steps and the summarizer consult lives in
//! [`PipelineConfig`]. Build one with [`PipelineConfig::builder()`] or
//! deserialize it from JSON.

use serde::{Deserialize, Serialize};

const MB: u64 = 1024 * 1024;

/// Configuration for the preprocessing pipeline.
///
/// # Example
///
/// ```rust,ignore
/// use datasage_pipeline::config::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .large_file_threshold_bytes(512 * 1024 * 1024)
///     .zscore_threshold(3.0)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // ---- loading ----
    /// Files larger than this are read with the partitioned engine.
    /// Default: 2 GB
    pub large_file_threshold_bytes: u64,

    /// Files larger than this (but still eager) use low-memory CSV parsing.
    /// Default: 500 MB
    pub low_memory_threshold_bytes: u64,

    /// Upper bound on the in-memory table size. Exceeding it while loading
    /// switches to the partitioned engine.
    /// Default: None (unbounded)
    pub memory_budget_bytes: Option<u64>,

    /// Rows read by the dtype pre-pass.
    /// Default: 10 000
    pub sniff_sample_rows: usize,

    /// String columns with fewer uniques than this (and fewer than half the
    /// sample) become categorical.
    /// Default: 50
    pub categorical_max_uniques: usize,

    // ---- schema analysis ----
    /// Rows sampled for role inference on the partitioned engine.
    /// Default: 10 000
    pub schema_sample_rows: usize,

    /// Uniqueness ratio above which an id-like column is an identifier.
    /// Default: 0.95
    pub id_uniqueness_ratio: f64,

    /// Fraction of values that must parse as datetimes for a datetime role.
    /// Default: 0.80
    pub datetime_parse_ratio: f64,

    /// Mean string length above which a column is free text.
    /// Default: 50.0
    pub text_mean_length: f64,

    // ---- type fixing ----
    /// Non-null values sampled per text column when deciding coercions.
    /// Default: 1 000
    pub type_sample_rows: usize,

    /// Minimum numeric parse rate for numeric coercion.
    /// Default: 0.95
    pub numeric_coercion_ratio: f64,

    // ---- missing values ----
    /// Null fraction at or above which an indicator column is added.
    /// Default: 0.05
    pub missing_indicator_threshold: f64,

    /// Null fraction above which no automatic imputation happens.
    /// Default: 0.30
    pub missing_impute_max: f64,

    // ---- outliers ----
    /// Row cap for outlier detection.
    /// Default: 50 000
    pub outlier_sample_rows: usize,

    /// Columns with fewer valid values are skipped.
    /// Default: 10
    pub outlier_min_values: usize,

    /// Below this sample size the exact (Shapiro-Wilk) test is used.
    /// Default: 5 000
    pub exact_normality_max_n: usize,

    /// p-value above which a column is treated as approximately normal.
    /// Default: 0.05
    pub normality_alpha: f64,

    /// |z| above which a value is an outlier under the Z-score rule.
    /// Default: 3.5
    pub zscore_threshold: f64,

    /// IQR multiplier for the Tukey fence.
    /// Default: 3.0
    pub iqr_multiplier: f64,

    // ---- encoder suggestions ----
    /// Highest cardinality that still gets one-hot encoding.
    /// Default: 10
    pub one_hot_max_uniques: usize,

    /// Highest cardinality that still gets ordinal/label encoding.
    /// Default: 50
    pub ordinal_max_uniques: usize,

    // ---- summarizer ----
    /// |r| above which a numeric pair is reported.
    /// Default: 0.85
    pub high_correlation_threshold: f64,

    /// Largest cardinality that gets a class-balance snapshot.
    /// Default: 20
    pub class_balance_max_uniques: usize,

    /// Number of most frequent values kept per column.
    /// Default: 5
    pub top_k_values: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            large_file_threshold_bytes: 2000 * MB,
            low_memory_threshold_bytes: 500 * MB,
            memory_budget_bytes: None,
            sniff_sample_rows: 10_000,
            categorical_max_uniques: 50,
            schema_sample_rows: 10_000,
            id_uniqueness_ratio: 0.95,
            datetime_parse_ratio: 0.80,
            text_mean_length: 50.0,
            type_sample_rows: 1_000,
            numeric_coercion_ratio: 0.95,
            missing_indicator_threshold: 0.05,
            missing_impute_max: 0.30,
            outlier_sample_rows: 50_000,
            outlier_min_values: 10,
            exact_normality_max_n: 5_000,
            normality_alpha: 0.05,
            zscore_threshold: 3.5,
            iqr_multiplier: 3.0,
            one_hot_max_uniques: 10,
            ordinal_max_uniques: 50,
            high_correlation_threshold: 0.85,
            class_balance_max_uniques: 20,
            top_k_values: 5,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let ratios = [
            ("id_uniqueness_ratio", self.id_uniqueness_ratio),
            ("datetime_parse_ratio", self.datetime_parse_ratio),
            ("numeric_coercion_ratio", self.numeric_coercion_ratio),
            ("missing_indicator_threshold", self.missing_indicator_threshold),
            ("missing_impute_max", self.missing_impute_max),
            ("normality_alpha", self.normality_alpha),
            ("high_correlation_threshold", self.high_correlation_threshold),
        ];
        for (field, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigValidationError::InvalidThreshold {
                    field: field.to_string(),
                    value,
                });
            }
        }

        let samples = [
            ("sniff_sample_rows", self.sniff_sample_rows),
            ("schema_sample_rows", self.schema_sample_rows),
            ("type_sample_rows", self.type_sample_rows),
            ("outlier_sample_rows", self.outlier_sample_rows),
            ("top_k_values", self.top_k_values),
        ];
        for (field, value) in samples {
            if value == 0 {
                return Err(ConfigValidationError::InvalidSampleSize(field.to_string()));
            }
        }

        if self.missing_indicator_threshold > self.missing_impute_max {
            return Err(ConfigValidationError::InconsistentMissingThresholds {
                indicator: self.missing_indicator_threshold,
                impute_max: self.missing_impute_max,
            });
        }

        if self.one_hot_max_uniques > self.ordinal_max_uniques {
            return Err(ConfigValidationError::InconsistentEncoderLimits {
                one_hot: self.one_hot_max_uniques,
                ordinal: self.ordinal_max_uniques,
            });
        }

        if self.zscore_threshold <= 0.0 || self.iqr_multiplier <= 0.0 {
            return Err(ConfigValidationError::InvalidOutlierRule);
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid threshold for '{field}': {value} (must be between 0.0 and 1.0)")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid sample size for '{0}' (must be at least 1)")]
    InvalidSampleSize(String),

    #[error(
        "Indicator threshold {indicator} must not exceed the imputation ceiling {impute_max}"
    )]
    InconsistentMissingThresholds { indicator: f64, impute_max: f64 },

    #[error("One-hot limit {one_hot} must not exceed the ordinal limit {ordinal}")]
    InconsistentEncoderLimits { one_hot: usize, ordinal: usize },

    #[error("Outlier thresholds must be positive")]
    InvalidOutlierRule,
}

/// Builder for [`PipelineConfig`] with fluent API.
///
/// Unset fields keep their [`PipelineConfig::default()`] values.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    large_file_threshold_bytes: Option<u64>,
    low_memory_threshold_bytes: Option<u64>,
    memory_budget_bytes: Option<u64>,
    sniff_sample_rows: Option<usize>,
    schema_sample_rows: Option<usize>,
    type_sample_rows: Option<usize>,
    outlier_sample_rows: Option<usize>,
    id_uniqueness_ratio: Option<f64>,
    datetime_parse_ratio: Option<f64>,
    numeric_coercion_ratio: Option<f64>,
    missing_indicator_threshold: Option<f64>,
    missing_impute_max: Option<f64>,
    zscore_threshold: Option<f64>,
    iqr_multiplier: Option<f64>,
    high_correlation_threshold: Option<f64>,
    top_k_values: Option<usize>,
}

impl PipelineConfigBuilder {
    /// Set the file size above which the partitioned engine is used.
    pub fn large_file_threshold_bytes(mut self, bytes: u64) -> Self {
        self.large_file_threshold_bytes = Some(bytes);
        self
    }

    /// Set the file size above which eager CSV reads use low-memory parsing.
    pub fn low_memory_threshold_bytes(mut self, bytes: u64) -> Self {
        self.low_memory_threshold_bytes = Some(bytes);
        self
    }

    /// Cap the in-memory table size.
    ///
    /// An eager load that exceeds the budget falls back to the partitioned
    /// engine instead of failing.
    pub fn memory_budget_bytes(mut self, bytes: u64) -> Self {
        self.memory_budget_bytes = Some(bytes);
        self
    }

    pub fn sniff_sample_rows(mut self, rows: usize) -> Self {
        self.sniff_sample_rows = Some(rows);
        self
    }

    pub fn schema_sample_rows(mut self, rows: usize) -> Self {
        self.schema_sample_rows = Some(rows);
        self
    }

    pub fn type_sample_rows(mut self, rows: usize) -> Self {
        self.type_sample_rows = Some(rows);
        self
    }

    pub fn outlier_sample_rows(mut self, rows: usize) -> Self {
        self.outlier_sample_rows = Some(rows);
        self
    }

    pub fn id_uniqueness_ratio(mut self, ratio: f64) -> Self {
        self.id_uniqueness_ratio = Some(ratio);
        self
    }

    pub fn datetime_parse_ratio(mut self, ratio: f64) -> Self {
        self.datetime_parse_ratio = Some(ratio);
        self
    }

    pub fn numeric_coercion_ratio(mut self, ratio: f64) -> Self {
        self.numeric_coercion_ratio = Some(ratio);
        self
    }

    /// Set the null fraction at which indicator columns are added.
    pub fn missing_indicator_threshold(mut self, threshold: f64) -> Self {
        self.missing_indicator_threshold = Some(threshold);
        self
    }

    /// Set the null fraction above which imputation is left to the user.
    pub fn missing_impute_max(mut self, threshold: f64) -> Self {
        self.missing_impute_max = Some(threshold);
        self
    }

    pub fn zscore_threshold(mut self, threshold: f64) -> Self {
        self.zscore_threshold = Some(threshold);
        self
    }

    pub fn iqr_multiplier(mut self, multiplier: f64) -> Self {
        self.iqr_multiplier = Some(multiplier);
        self
    }

    pub fn high_correlation_threshold(mut self, threshold: f64) -> Self {
        self.high_correlation_threshold = Some(threshold);
        self
    }

    pub fn top_k_values(mut self, k: usize) -> Self {
        self.top_k_values = Some(k);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            large_file_threshold_bytes: self
                .large_file_threshold_bytes
                .unwrap_or(defaults.large_file_threshold_bytes),
            low_memory_threshold_bytes: self
                .low_memory_threshold_bytes
                .unwrap_or(defaults.low_memory_threshold_bytes),
            memory_budget_bytes: self.memory_budget_bytes,
            sniff_sample_rows: self.sniff_sample_rows.unwrap_or(defaults.sniff_sample_rows),
            schema_sample_rows: self.schema_sample_rows.unwrap_or(defaults.schema_sample_rows),
            type_sample_rows: self.type_sample_rows.unwrap_or(defaults.type_sample_rows),
            outlier_sample_rows: self
                .outlier_sample_rows
                .unwrap_or(defaults.outlier_sample_rows),
            id_uniqueness_ratio: self
                .id_uniqueness_ratio
                .unwrap_or(defaults.id_uniqueness_ratio),
            datetime_parse_ratio: self
                .datetime_parse_ratio
                .unwrap_or(defaults.datetime_parse_ratio),
            numeric_coercion_ratio: self
                .numeric_coercion_ratio
                .unwrap_or(defaults.numeric_coercion_ratio),
            missing_indicator_threshold: self
                .missing_indicator_threshold
                .unwrap_or(defaults.missing_indicator_threshold),
            missing_impute_max: self.missing_impute_max.unwrap_or(defaults.missing_impute_max),
            zscore_threshold: self.zscore_threshold.unwrap_or(defaults.zscore_threshold),
            iqr_multiplier: self.iqr_multiplier.unwrap_or(defaults.iqr_multiplier),
            high_correlation_threshold: self
                .high_correlation_threshold
                .unwrap_or(defaults.high_correlation_threshold),
            top_k_values: self.top_k_values.unwrap_or(defaults.top_k_values),
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }
}
