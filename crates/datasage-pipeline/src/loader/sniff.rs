//! Dtype pre-pass.
//!
//! A bounded sample decides which integer columns could be stored narrower
//! and which string columns are low-cardinality enough to become
//! categorical. Integer narrowing is only applied after the full column
//! range has been checked, so the sample never causes an overflow.

use crate::error::Result;
use crate::table::Table;
use crate::utils::{categorical_dtype, is_integer_dtype, narrowest_int_dtype};
use polars::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

/// What the sample suggests for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum DtypeAdjustment {
    /// Signed integer column; the sample range is advisory.
    Integer { sample_min: i64, sample_max: i64 },
    /// Low-cardinality string column.
    Categorical,
}

/// Per-column adjustments suggested by the sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DtypePlan {
    pub adjustments: BTreeMap<String, DtypeAdjustment>,
}

impl DtypePlan {
    /// Build a plan from a sample of at most `sniff_sample_rows` rows.
    pub fn from_sample(sample: &DataFrame, categorical_max_uniques: usize) -> Result<Self> {
        let mut adjustments = BTreeMap::new();
        let rows = sample.height();

        for column in sample.get_columns() {
            let name = column.name().to_string();
            let series = column.as_materialized_series();
            let dtype = series.dtype();

            if matches!(dtype, DataType::Int32 | DataType::Int64) {
                let ints = series.cast(&DataType::Int64)?;
                let ints = ints.i64()?;
                if let (Some(min), Some(max)) = (ints.min(), ints.max()) {
                    adjustments.insert(
                        name,
                        DtypeAdjustment::Integer {
                            sample_min: min,
                            sample_max: max,
                        },
                    );
                }
            } else if dtype == &DataType::String {
                let uniques = series.drop_nulls().n_unique()?;
                if uniques > 0
                    && uniques < categorical_max_uniques
                    && (uniques as f64) < rows as f64 / 2.0
                {
                    adjustments.insert(name, DtypeAdjustment::Categorical);
                }
            }
        }

        Ok(Self { adjustments })
    }

    /// The dtype each adjusted column would get, judged from the sample alone.
    pub fn advisory_dtypes(&self) -> BTreeMap<String, String> {
        self.adjustments
            .iter()
            .map(|(name, adjustment)| {
                let dtype = match adjustment {
                    DtypeAdjustment::Integer {
                        sample_min,
                        sample_max,
                    } => narrowest_int_dtype(*sample_min, *sample_max),
                    DtypeAdjustment::Categorical => categorical_dtype(),
                };
                (name.clone(), dtype.to_string())
            })
            .collect()
    }

    /// Apply the plan to a loaded table.
    ///
    /// Categorical conversion is safe for any value and runs on both
    /// engines. Integer narrowing needs the full column range, so it only
    /// runs on an in-memory table where that range is cheap to compute.
    pub fn apply(&self, table: Box<dyn Table>) -> Result<Box<dyn Table>> {
        let schema: BTreeMap<String, DataType> = table.schema()?.into_iter().collect();
        let mut exprs = Vec::new();

        let integer_columns: Vec<&String> = self
            .adjustments
            .iter()
            .filter(|(_, a)| matches!(a, DtypeAdjustment::Integer { .. }))
            .map(|(name, _)| name)
            .collect();

        if table.materialized().is_some() && !integer_columns.is_empty() {
            let ranges = table.aggregate(
                integer_columns
                    .iter()
                    .flat_map(|name| {
                        [
                            col(name.as_str())
                                .min()
                                .cast(DataType::Int64)
                                .alias(format!("{name}__min")),
                            col(name.as_str())
                                .max()
                                .cast(DataType::Int64)
                                .alias(format!("{name}__max")),
                        ]
                    })
                    .collect(),
            )?;

            for name in integer_columns {
                let min = scalar_i64(&ranges, &format!("{name}__min"))?;
                let max = scalar_i64(&ranges, &format!("{name}__max"))?;
                let (Some(min), Some(max)) = (min, max) else {
                    continue;
                };
                let target = narrowest_int_dtype(min, max);
                let current = schema.get(name.as_str());
                if current.is_some_and(|dtype| is_integer_dtype(dtype) && width(dtype) > width(&target))
                {
                    debug!("Downcasting '{}' to {}", name, target);
                    exprs.push(col(name.as_str()).cast(target));
                }
            }
        }

        for (name, adjustment) in &self.adjustments {
            if matches!(adjustment, DtypeAdjustment::Categorical)
                && schema.get(name.as_str()) == Some(&DataType::String)
            {
                debug!("Converting '{}' to categorical", name);
                exprs.push(col(name.as_str()).cast(categorical_dtype()));
            }
        }

        if exprs.is_empty() {
            return Ok(table);
        }
        table.with_columns(exprs)
    }
}

fn scalar_i64(frame: &DataFrame, name: &str) -> Result<Option<i64>> {
    Ok(frame
        .column(name)?
        .as_materialized_series()
        .i64()?
        .get(0))
}

fn width(dtype: &DataType) -> u8 {
    match dtype {
        DataType::Int8 | DataType::UInt8 => 8,
        DataType::Int16 | DataType::UInt16 => 16,
        DataType::Int32 | DataType::UInt32 => 32,
        _ => 64,
    }
}
