//! Human-readable descriptions of the audit log.

use crate::types::{LogEntry, StepAction};
use serde_json::Value;

fn after_field<'a>(entry: &'a LogEntry, key: &str) -> Option<&'a Value> {
    entry.after_value.as_ref()?.get(key)
}

/// Render a JSON scalar without the quotes strings get from `to_string`.
fn plain(value: Option<&Value>, default: &str) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => default.to_string(),
        Some(other) => other.to_string(),
    }
}

/// One sentence describing what a log entry changed.
pub fn describe_change(entry: &LogEntry) -> String {
    let column = entry
        .column_name
        .as_deref()
        .map(|c| format!("`{c}`"))
        .unwrap_or_else(|| "dataset".to_string());

    match entry.action {
        StepAction::Impute => format!(
            "Filled missing values in {} using {} (value: {}).",
            column,
            plain(after_field(entry, "method"), "imputation"),
            plain(after_field(entry, "fill_val"), "calculated value")
        ),
        StepAction::AddIndicator => format!(
            "Added a missingness indicator column for {column} to preserve null signal."
        ),
        StepAction::FlagOutliers => {
            let pct = after_field(entry, "pct").and_then(Value::as_f64).unwrap_or(0.0);
            format!(
                "Flagged {} potential outliers in {} ({:.1}%) using {}.",
                plain(after_field(entry, "count"), "0"),
                column,
                pct * 100.0,
                plain(after_field(entry, "method"), "IQR")
            )
        }
        StepAction::RenameColumn => {
            let old = entry
                .before_value
                .as_ref()
                .and_then(|v| v.get("name"))
                .and_then(Value::as_str);
            let new = plain(after_field(entry, "new_name"), "normalized name");
            match old {
                Some(old) => format!("Renamed `{old}` to `{new}` for consistent schema naming."),
                None => format!("Renamed {column} to `{new}` for consistent schema naming."),
            }
        }
        StepAction::CoerceNumeric | StepAction::CoerceBoolean | StepAction::CoerceDatetime => {
            format!(
                "Converted {} to `{}` to stabilize downstream analysis.",
                column,
                plain(after_field(entry, "dtype"), "supported type")
            )
        }
        StepAction::SkipColumn => format!(
            "Skipped {} in {} due to invalid/statistically unsafe values.",
            column, entry.step_name
        ),
        _ => match &entry.reason {
            Some(reason) => reason.clone(),
            None => format!(
                "Updated {} during {} ({}).",
                column,
                entry.step_name,
                entry.action.as_str()
            ),
        },
    }
}

/// Describe every entry, in log order.
pub fn processing_narrative(logs: &[LogEntry]) -> Vec<String> {
    logs.iter().map(describe_change).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_describe_impute() {
        let entry = LogEntry::new("MissingValueHandler", StepAction::Impute)
            .column("age")
            .after(json!({ "method": "median", "fill_val": "25" }));
        assert_eq!(
            describe_change(&entry),
            "Filled missing values in `age` using median (value: 25)."
        );
    }

    #[test]
    fn test_describe_rename_uses_old_name() {
        let entry = LogEntry::new("ColumnNormalizer", StepAction::RenameColumn)
            .column("patient_age")
            .before(json!({ "name": "Patient Age" }))
            .after(json!({ "new_name": "patient_age" }));
        assert_eq!(
            describe_change(&entry),
            "Renamed `Patient Age` to `patient_age` for consistent schema naming."
        );
    }

    #[test]
    fn test_describe_outliers() {
        let entry = LogEntry::new("OutlierDetector", StepAction::FlagOutliers)
            .column("age")
            .after(json!({ "count": 3, "pct": 0.03, "method": "IQR" }));
        assert_eq!(
            describe_change(&entry),
            "Flagged 3 potential outliers in `age` (3.0%) using IQR."
        );
    }

    #[test]
    fn test_fallbacks() {
        let with_reason = LogEntry::new("DuplicateDetector", StepAction::SkipDuplicateCheck)
            .reason("Exact duplicate detection needs the full table in memory.");
        assert_eq!(
            describe_change(&with_reason),
            "Exact duplicate detection needs the full table in memory."
        );

        let bare = LogEntry::new("EncoderSuggester", StepAction::SuggestEncoder).column("city");
        assert_eq!(
            describe_change(&bare),
            "Updated `city` during EncoderSuggester (suggest_encoder)."
        );
    }

    #[test]
    fn test_processing_narrative_keeps_order() {
        let logs = vec![
            LogEntry::new("TypeFixer", StepAction::CoerceBoolean)
                .column("active")
                .after(json!({ "dtype": "bool" })),
            LogEntry::new("MissingValueHandler", StepAction::AddIndicator).column("age"),
        ];
        assert_eq!(
            processing_narrative(&logs),
            vec![
                "Converted `active` to `bool` to stabilize downstream analysis.".to_string(),
                "Added a missingness indicator column for `age` to preserve null signal."
                    .to_string(),
            ]
        );
    }
}
