//! Shared utilities for the pipeline.
//!
//! Dtype classification, the token vocabularies the steps agree on, and a
//! handful of small numeric helpers.

use polars::prelude::*;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    is_integer_dtype(dtype) || matches!(dtype, DataType::Float32 | DataType::Float64)
}

/// Check if a DataType is a signed or unsigned integer.
#[inline]
pub fn is_integer_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Check if a DataType is a datetime type.
#[inline]
pub fn is_datetime_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Datetime(_, _) | DataType::Date | DataType::Time
    )
}

/// Check if a DataType holds text (plain strings or dictionary-encoded strings).
#[inline]
pub fn is_text_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::String | DataType::Categorical(_, _))
}

/// Dictionary-encoded string dtype used for low-cardinality columns.
pub fn categorical_dtype() -> DataType {
    DataType::from_categories(Categories::global())
}

/// The dtype datetime coercion targets.
pub fn datetime_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, None)
}

/// Narrowest signed integer type holding every value in `[min, max]`.
pub fn narrowest_int_dtype(min: i64, max: i64) -> DataType {
    if min >= i16::MIN as i64 && max <= i16::MAX as i64 {
        DataType::Int16
    } else if min >= i32::MIN as i64 && max <= i32::MAX as i64 {
        DataType::Int32
    } else {
        DataType::Int64
    }
}

// =============================================================================
// Token Vocabularies
// =============================================================================

/// Name fragments that mark a column as an identifier candidate.
pub const ID_NAME_TOKENS: [&str; 3] = ["id", "key", "uuid"];

/// Strings treated as a missing value when checking boolean vocabularies.
pub const NULL_TOKENS: [&str; 4] = ["", "nan", "null", "none"];

/// Case-folded strings that coerce to `true`.
pub const TRUE_TOKENS: [&str; 4] = ["yes", "true", "1", "1.0"];

/// Case-folded strings that coerce to `false`.
pub const FALSE_TOKENS: [&str; 4] = ["no", "false", "0", "0.0"];

/// Whether a column name carries an identifier token.
///
/// Matches whole `_`-separated parts (`user_id`, `order_key`) and names that
/// end in a token (`userid`, `customerkey`).
pub fn has_id_token(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|part| ID_NAME_TOKENS.contains(&part))
        || ID_NAME_TOKENS.iter().any(|token| lower.ends_with(token))
}

/// Whether a value belongs to the boolean vocabulary (including null-like tokens).
pub fn is_boolean_token(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    let lower = lower.as_str();
    TRUE_TOKENS.contains(&lower) || FALSE_TOKENS.contains(&lower) || NULL_TOKENS.contains(&lower)
}

/// Try to parse a string as a finite number.
pub fn parse_numeric_string(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

// =============================================================================
// Series Helpers
// =============================================================================

/// Non-null values of a text column as owned strings, at most `limit` of them.
pub fn text_values(series: &Series, limit: usize) -> PolarsResult<Vec<String>> {
    let as_str = series.cast(&DataType::String)?;
    Ok(as_str
        .str()?
        .into_iter()
        .flatten()
        .take(limit)
        .map(str::to_string)
        .collect())
}

/// Finite values of a numeric (or numeric-castable) column.
pub fn finite_values(series: &Series) -> PolarsResult<Vec<f64>> {
    let floats = series.cast(&DataType::Float64)?;
    Ok(floats
        .f64()?
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .collect())
}

/// Outcome of trying to read a text column as dates or timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalParse {
    /// The temporal dtype that accepted the most values.
    pub dtype: DataType,
    /// Fraction of non-null entries that parsed under `dtype`.
    pub rate: f64,
}

/// Try both temporal casts on a text series and keep the better one.
///
/// The schema analyzer and the type fixer both go through this function, so
/// a column classified as a datetime is one the fixer can actually convert.
pub fn temporal_parse(series: &Series) -> PolarsResult<TemporalParse> {
    let as_str = series.cast(&DataType::String)?;
    let non_null = as_str.len() - as_str.null_count();
    if non_null == 0 {
        return Ok(TemporalParse {
            dtype: datetime_dtype(),
            rate: 0.0,
        });
    }

    let mut best = TemporalParse {
        dtype: datetime_dtype(),
        rate: 0.0,
    };
    for dtype in [datetime_dtype(), DataType::Date] {
        let parsed_count = match as_str.cast(&dtype) {
            Ok(parsed) => parsed.len() - parsed.null_count(),
            Err(_) => 0,
        };
        let rate = parsed_count as f64 / non_null as f64;
        if rate > best.rate {
            best = TemporalParse { dtype, rate };
        }
    }
    Ok(best)
}

/// Round to a fixed number of decimals.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== dtype tests ====================

    #[test]
    fn test_is_numeric_dtype() {
        assert!(is_numeric_dtype(&DataType::Int16));
        assert!(is_numeric_dtype(&DataType::Float64));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(!is_numeric_dtype(&DataType::Boolean));
    }

    #[test]
    fn test_narrowest_int_dtype() {
        assert_eq!(narrowest_int_dtype(-5, 300), DataType::Int16);
        assert_eq!(narrowest_int_dtype(0, 40_000), DataType::Int32);
        assert_eq!(narrowest_int_dtype(0, 5_000_000_000), DataType::Int64);
        assert_eq!(narrowest_int_dtype(-32_769, 0), DataType::Int32);
    }

    // ==================== token tests ====================

    #[test]
    fn test_has_id_token() {
        assert!(has_id_token("user_id"));
        assert!(has_id_token("customerkey"));
        assert!(has_id_token("UUID"));
        assert!(has_id_token("id"));
        assert!(!has_id_token("age"));
        assert!(!has_id_token("identity_score"));
    }

    #[test]
    fn test_is_boolean_token() {
        for token in ["Yes", "NO", "true", "0", "1.0", "", "NaN", " none "] {
            assert!(is_boolean_token(token), "{token} should be boolean-like");
        }
        assert!(!is_boolean_token("maybe"));
        assert!(!is_boolean_token("2"));
    }

    #[test]
    fn test_parse_numeric_string() {
        assert_eq!(parse_numeric_string(" 42 "), Some(42.0));
        assert_eq!(parse_numeric_string("1e3"), Some(1000.0));
        assert_eq!(parse_numeric_string("abc"), None);
        assert_eq!(parse_numeric_string("inf"), None);
    }

    // ==================== series tests ====================

    #[test]
    fn test_text_values_skips_nulls_and_limits() {
        let s = Series::new("x".into(), &[Some("a"), None, Some("b"), Some("c")]);
        assert_eq!(text_values(&s, 2).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_finite_values() {
        let s = Series::new("x".into(), &[Some(1.0), None, Some(f64::NAN), Some(3.0)]);
        assert_eq!(finite_values(&s).unwrap(), vec![1.0, 3.0]);
    }

    #[test]
    fn test_temporal_parse_rate() {
        let s = Series::new(
            "d".into(),
            &[Some("2024-01-15"), Some("2024-02-01"), None, Some("not a date")],
        );
        let parse = temporal_parse(&s).unwrap();
        assert!((parse.rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_temporal_parse_rejects_plain_words() {
        let s = Series::new("d".into(), &["alpha", "beta", "gamma"]);
        assert_eq!(temporal_parse(&s).unwrap().rate, 0.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.123456, 4), 0.1235);
        assert_eq!(round_to(87.25, 1), 87.3);
    }
}
