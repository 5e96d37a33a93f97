use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Roles and engines
// ============================================================================

/// Semantic category assigned to a column by the schema analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    IdCol,
    DatetimeCol,
    TextCol,
    FeatureCol,
    TargetCol,
    ConstantCol,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdCol => "id_col",
            Self::DatetimeCol => "datetime_col",
            Self::TextCol => "text_col",
            Self::FeatureCol => "feature_col",
            Self::TargetCol => "target_col",
            Self::ConstantCol => "constant_col",
        }
    }

    /// Map a loosely written role name onto a pipeline role.
    ///
    /// Accepts both the short aliases used in domain profiles (`id`, `text`,
    /// `categorical`, ...) and the canonical `_col` forms. Anything unknown
    /// is treated as a plain feature.
    pub fn from_alias(alias: &str) -> Self {
        match alias.trim().to_ascii_lowercase().as_str() {
            "id" | "id_col" => Self::IdCol,
            "text" | "text_col" => Self::TextCol,
            "datetime" | "datetime_col" => Self::DatetimeCol,
            "target" | "target_col" => Self::TargetCol,
            "constant" | "constant_col" => Self::ConstantCol,
            _ => Self::FeatureCol,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which execution strategy backs the table for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionEngine {
    /// The whole table is materialized in memory.
    #[default]
    InMemory,
    /// Work is recorded as a deferred plan over a scanned source.
    Partitioned,
}

impl ExecutionEngine {
    pub fn is_partitioned(&self) -> bool {
        matches!(self, Self::Partitioned)
    }
}

impl fmt::Display for ExecutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InMemory => f.write_str("in_memory"),
            Self::Partitioned => f.write_str("partitioned"),
        }
    }
}

// ============================================================================
// Audit log
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
}

/// Actions recorded by the preprocessing steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    RenameColumn,
    RoleAssignment,
    StripWhitespace,
    CoerceNumeric,
    CoerceBoolean,
    CoerceDatetime,
    AddIndicator,
    Impute,
    FlagHighMissing,
    FlagDuplicates,
    SkipDuplicateCheck,
    FlagOutliers,
    DomainSanityWarning,
    SkipColumn,
    SuggestEncoder,
}

impl StepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RenameColumn => "rename_column",
            Self::RoleAssignment => "role_assignment",
            Self::StripWhitespace => "strip_whitespace",
            Self::CoerceNumeric => "coerce_numeric",
            Self::CoerceBoolean => "coerce_boolean",
            Self::CoerceDatetime => "coerce_datetime",
            Self::AddIndicator => "add_indicator",
            Self::Impute => "impute",
            Self::FlagHighMissing => "flag_high_missing",
            Self::FlagDuplicates => "flag_duplicates",
            Self::SkipDuplicateCheck => "skip_duplicate_check",
            Self::FlagOutliers => "flag_outliers",
            Self::DomainSanityWarning => "domain_sanity_warning",
            Self::SkipColumn => "skip_column",
            Self::SuggestEncoder => "suggest_encoder",
        }
    }

    /// True for the three type coercions performed by the type fixer.
    pub fn is_coercion(&self) -> bool {
        matches!(
            self,
            Self::CoerceNumeric | Self::CoerceBoolean | Self::CoerceDatetime
        )
    }
}

/// A single audit record emitted by a preprocessing step.
///
/// Entries are append-only: steps build them with the `with_*` helpers and
/// hand them to the orchestrator, which never edits them afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub step_name: String,
    pub action: StepAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub severity: Severity,
}

impl LogEntry {
    pub fn new(step_name: impl Into<String>, action: StepAction) -> Self {
        Self {
            step_name: step_name.into(),
            action,
            column_name: None,
            before_value: None,
            after_value: None,
            reason: None,
            severity: Severity::Info,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column_name = Some(column.into());
        self
    }

    pub fn before(mut self, value: serde_json::Value) -> Self {
        self.before_value = Some(value);
        self
    }

    pub fn after(mut self, value: serde_json::Value) -> Self {
        self.after_value = Some(value);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Read a string field out of `after_value`.
    pub fn after_str(&self, key: &str) -> Option<&str> {
        self.after_value.as_ref()?.get(key)?.as_str()
    }
}

// ============================================================================
// Profiles
// ============================================================================

/// Shape classification of a column's distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionType {
    RightSkewed,
    LeftSkewed,
    Categorical,
    Normal,
    Text,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub rows: usize,
    pub cols: usize,
}

/// Per-column statistics computed on the cleaned table.
///
/// Percentages are fractions in `[0, 1]` rounded to four decimals. Numeric
/// moments are only present for numeric columns with at least one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub dtype: String,
    pub role: Role,
    pub null_pct: f64,
    pub null_count: usize,
    pub unique_count: usize,
    pub unique_pct: f64,
    pub distribution_type: DistributionType,
    pub outlier_count: usize,
    pub outlier_pct: f64,
    pub top_k_values: Vec<ValueCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skewness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kurtosis: Option<f64>,
}

impl ColumnProfile {
    /// A profile with no statistics filled in yet.
    pub fn empty(name: impl Into<String>, dtype: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            dtype: dtype.into(),
            role,
            null_pct: 0.0,
            null_count: 0,
            unique_count: 0,
            unique_pct: 0.0,
            distribution_type: DistributionType::Unknown,
            outlier_count: 0,
            outlier_pct: 0.0,
            top_k_values: Vec::new(),
            min: None,
            max: None,
            mean: None,
            median: None,
            std: None,
            skewness: None,
            kurtosis: None,
        }
    }
}

/// A pair of numeric columns whose Pearson correlation exceeds the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighCorrelation {
    pub col1: String,
    pub col2: String,
    pub correlation: f64,
    pub concern: bool,
}

/// Dataset-level profile produced by the summarizer.
///
/// `dataset_quality_score` is derived from `columns` and can always be
/// recomputed with [`crate::quality::quality_score`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub shape: Shape,
    pub memory_mb: f64,
    pub domain: String,
    pub columns: Vec<ColumnProfile>,
    pub high_correlations: Vec<HighCorrelation>,
    pub time_series_detected: bool,
    pub datetime_columns: Vec<String>,
    pub text_columns: Vec<String>,
    pub potential_target_columns: Vec<String>,
    pub class_balance: BTreeMap<String, BTreeMap<String, usize>>,
    pub dataset_quality_score: f64,
    pub warnings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl DatasetProfile {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_role_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Role::IdCol).unwrap(), "\"id_col\"");
        assert_eq!(
            serde_json::to_string(&Role::DatetimeCol).unwrap(),
            "\"datetime_col\""
        );
    }

    #[test]
    fn test_role_from_alias() {
        assert_eq!(Role::from_alias("id"), Role::IdCol);
        assert_eq!(Role::from_alias(" Text "), Role::TextCol);
        assert_eq!(Role::from_alias("categorical"), Role::FeatureCol);
        assert_eq!(Role::from_alias("constant_col"), Role::ConstantCol);
        assert_eq!(Role::from_alias("something-else"), Role::FeatureCol);
    }

    #[test]
    fn test_engine_display() {
        assert_eq!(ExecutionEngine::InMemory.to_string(), "in_memory");
        assert_eq!(ExecutionEngine::Partitioned.to_string(), "partitioned");
        assert!(ExecutionEngine::Partitioned.is_partitioned());
    }

    #[test]
    fn test_log_entry_builder() {
        let entry = LogEntry::new("MissingValueHandler", StepAction::Impute)
            .column("age")
            .after(json!({"method": "median", "fill_val": "25"}))
            .severity(Severity::Info);

        assert_eq!(entry.column_name.as_deref(), Some("age"));
        assert_eq!(entry.after_str("method"), Some("median"));
        assert_eq!(entry.after_str("missing"), None);
    }

    #[test]
    fn test_log_entry_serialization_skips_empty_fields() {
        let entry = LogEntry::new("DuplicateDetector", StepAction::SkipDuplicateCheck);
        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(
            value,
            json!({
                "step_name": "DuplicateDetector",
                "action": "skip_duplicate_check",
                "severity": "info"
            })
        );
    }

    #[test]
    fn test_step_action_strings_match_serde() {
        for action in [
            StepAction::RenameColumn,
            StepAction::FlagOutliers,
            StepAction::SuggestEncoder,
        ] {
            let serialized = serde_json::to_string(&action).unwrap();
            assert_eq!(serialized, format!("\"{}\"", action.as_str()));
        }
        assert!(StepAction::CoerceBoolean.is_coercion());
        assert!(!StepAction::Impute.is_coercion());
    }
}
