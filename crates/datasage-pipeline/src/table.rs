//! The table capability shared by both execution engines.
//!
//! Every preprocessing step talks to a `Box<dyn Table>` and expresses its
//! column changes as Polars expressions. [`EagerTable`] applies them to a
//! materialized `DataFrame` straight away; [`LazyTable`] records them on a
//! deferred plan over the scanned source and only runs a full pass when a
//! step asks for an aggregate or when the cleaned table is finally
//! collected.

use crate::error::{PipelineError, Result};
use crate::types::ExecutionEngine;
use polars::prelude::*;
use std::cell::Cell;
use std::collections::HashMap;
use tempfile::TempDir;

/// A column name and its dtype, in table order.
pub type ColumnSchema = Vec<(String, DataType)>;

/// Operations every execution engine provides.
pub trait Table: Send {
    /// Which engine backs this table.
    fn engine(&self) -> ExecutionEngine;

    /// Column names and dtypes in order.
    fn schema(&self) -> Result<ColumnSchema>;

    /// Total row count.
    fn height(&self) -> usize;

    /// The first `n` rows (or all of them), never a full materialization.
    ///
    /// Both engines return the same rows for the same content, so any
    /// decision taken from a sample does not depend on the engine.
    fn sample(&self, n: usize) -> Result<DataFrame>;

    /// Run a read-only query over the whole table.
    fn query(&self, build: &dyn Fn(LazyFrame) -> PolarsResult<LazyFrame>) -> Result<DataFrame>;

    /// Replace the table with `build` applied to it.
    fn transform(self: Box<Self>, build: &dyn Fn(LazyFrame) -> LazyFrame)
    -> Result<Box<dyn Table>>;

    /// The in-memory frame, when the engine holds one.
    fn materialized(&self) -> Option<&DataFrame>;

    /// Number of full passes over the source triggered so far.
    fn full_passes(&self) -> usize;

    /// Materialize the table.
    fn collect(self: Box<Self>) -> Result<DataFrame>;

    /// Column names in order.
    fn column_names(&self) -> Result<Vec<String>> {
        Ok(self.schema()?.into_iter().map(|(name, _)| name).collect())
    }

    /// Evaluate aggregate expressions over the whole table.
    fn aggregate(&self, exprs: Vec<Expr>) -> Result<DataFrame> {
        self.query(&move |lf| Ok(lf.select(exprs.clone())))
    }

    /// Add or replace columns.
    fn with_columns(self: Box<Self>, exprs: Vec<Expr>) -> Result<Box<dyn Table>> {
        self.transform(&move |lf| lf.with_columns(exprs.clone()))
    }

    /// Keep exactly the given expressions as the new column set.
    fn select(self: Box<Self>, exprs: Vec<Expr>) -> Result<Box<dyn Table>> {
        self.transform(&move |lf| lf.select(exprs.clone()))
    }

    /// Most frequent non-null value of each column, in one query.
    ///
    /// Ties go to the smallest value. Columns that are entirely null are
    /// absent from the result.
    fn modes(&self, columns: &[String]) -> Result<HashMap<String, String>> {
        if columns.is_empty() {
            return Ok(HashMap::new());
        }
        let names = columns.to_vec();
        let counts = self.query(&move |lf| {
            let plans = names
                .iter()
                .map(|name| {
                    value_counts_plan(lf.clone(), name.as_str())
                        .with_column(lit(name.as_str()).alias("column"))
                })
                .collect::<Vec<_>>();
            concat(plans, UnionArgs::default())
        })?;

        let column = counts.column("column")?.as_materialized_series().clone();
        let values = counts.column("value")?.as_materialized_series().clone();
        let totals = counts
            .column("count")?
            .as_materialized_series()
            .cast(&DataType::UInt64)?;

        let mut best: HashMap<String, (String, u64)> = HashMap::new();
        let rows = column
            .str()?
            .into_iter()
            .zip(values.str()?.into_iter())
            .zip(totals.u64()?.into_iter());
        for ((name, value), count) in rows {
            let (Some(name), Some(value), Some(count)) = (name, value, count) else {
                continue;
            };
            let better = match best.get(name) {
                Some((current, current_count)) => {
                    count > *current_count || (count == *current_count && value < current.as_str())
                }
                None => true,
            };
            if better {
                best.insert(name.to_string(), (value.to_string(), count));
            }
        }
        Ok(best.into_iter().map(|(name, (value, _))| (name, value)).collect())
    }
}

/// Non-null values of `column` as strings, grouped with their counts.
fn value_counts_plan(lf: LazyFrame, column: &str) -> LazyFrame {
    lf.filter(col(column).is_not_null())
        .group_by([col(column).cast(DataType::String).alias("value")])
        .agg([len().alias("count")])
}

static_assertions::assert_impl_all!(Box<dyn Table>: Send);

// ============================================================================
// Eager engine
// ============================================================================

/// A fully materialized table.
///
/// When a memory budget is set, any transformation that grows the frame past
/// it fails with [`PipelineError::ResourceExhausted`] so the orchestrator can
/// retry the run on the partitioned engine.
pub struct EagerTable {
    df: DataFrame,
    budget_bytes: Option<u64>,
}

impl EagerTable {
    pub fn new(df: DataFrame, budget_bytes: Option<u64>) -> Self {
        Self { df, budget_bytes }
    }

    fn check_budget(&self) -> Result<()> {
        if let Some(budget) = self.budget_bytes {
            let size = self.df.estimated_size() as u64;
            if size > budget {
                return Err(PipelineError::ResourceExhausted(format!(
                    "in-memory table grew to {size} bytes, budget is {budget} bytes"
                )));
            }
        }
        Ok(())
    }
}

impl Table for EagerTable {
    fn engine(&self) -> ExecutionEngine {
        ExecutionEngine::InMemory
    }

    fn schema(&self) -> Result<ColumnSchema> {
        Ok(self
            .df
            .get_columns()
            .iter()
            .map(|c| (c.name().to_string(), c.dtype().clone()))
            .collect())
    }

    fn height(&self) -> usize {
        self.df.height()
    }

    fn sample(&self, n: usize) -> Result<DataFrame> {
        Ok(self.df.head(Some(n)))
    }

    fn query(&self, build: &dyn Fn(LazyFrame) -> PolarsResult<LazyFrame>) -> Result<DataFrame> {
        Ok(build(self.df.clone().lazy())?.collect()?)
    }

    fn transform(
        self: Box<Self>,
        build: &dyn Fn(LazyFrame) -> LazyFrame,
    ) -> Result<Box<dyn Table>> {
        let budget_bytes = self.budget_bytes;
        let df = build(self.df.lazy()).collect()?;
        let table = EagerTable { df, budget_bytes };
        table.check_budget()?;
        Ok(Box::new(table))
    }

    fn materialized(&self) -> Option<&DataFrame> {
        Some(&self.df)
    }

    fn full_passes(&self) -> usize {
        0
    }

    fn collect(self: Box<Self>) -> Result<DataFrame> {
        Ok(self.df)
    }
}

// ============================================================================
// Partitioned engine
// ============================================================================

/// A deferred plan over a scanned source.
///
/// The row count is computed once on construction. Aggregates and the final
/// collect are the only operations that touch the whole source; each one is
/// counted in [`Table::full_passes`].
pub struct LazyTable {
    lf: LazyFrame,
    rows: usize,
    passes: Cell<usize>,
    // Keeps extracted or converted payloads alive while the plan references them.
    _workdirs: Vec<TempDir>,
}

impl LazyTable {
    pub fn new(lf: LazyFrame) -> Result<Self> {
        let counted = lf.clone().select([len().alias("rows")]).collect()?;
        let rows = counted
            .column("rows")?
            .as_materialized_series()
            .cast(&DataType::UInt64)?
            .u64()?
            .get(0)
            .unwrap_or(0) as usize;

        Ok(Self {
            lf,
            rows,
            passes: Cell::new(1),
            _workdirs: Vec::new(),
        })
    }

    /// Tie the lifetime of scratch directories to this table.
    pub fn keep_alive(mut self, dirs: impl IntoIterator<Item = TempDir>) -> Self {
        self._workdirs.extend(dirs);
        self
    }
}

impl Table for LazyTable {
    fn engine(&self) -> ExecutionEngine {
        ExecutionEngine::Partitioned
    }

    fn schema(&self) -> Result<ColumnSchema> {
        let schema = self.lf.clone().collect_schema()?;
        Ok(schema
            .iter()
            .map(|(name, dtype)| (name.to_string(), dtype.clone()))
            .collect())
    }

    fn height(&self) -> usize {
        self.rows
    }

    fn sample(&self, n: usize) -> Result<DataFrame> {
        Ok(self.lf.clone().limit(n as IdxSize).collect()?)
    }

    fn query(&self, build: &dyn Fn(LazyFrame) -> PolarsResult<LazyFrame>) -> Result<DataFrame> {
        self.passes.set(self.passes.get() + 1);
        Ok(build(self.lf.clone())?.collect()?)
    }

    fn transform(
        self: Box<Self>,
        build: &dyn Fn(LazyFrame) -> LazyFrame,
    ) -> Result<Box<dyn Table>> {
        let this = *self;
        Ok(Box::new(LazyTable {
            lf: build(this.lf),
            rows: this.rows,
            passes: this.passes,
            _workdirs: this._workdirs,
        }))
    }

    fn materialized(&self) -> Option<&DataFrame> {
        None
    }

    fn full_passes(&self) -> usize {
        self.passes.get()
    }

    fn collect(self: Box<Self>) -> Result<DataFrame> {
        Ok(self.lf.collect()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_df() -> DataFrame {
        df![
            "id" => [1i64, 2, 3, 4, 5, 6],
            "city" => [Some("Oslo"), Some("Rome"), None, Some("Oslo"), Some("Lima"), Some("Rome")],
            "score" => [Some(1.5), None, Some(3.0), Some(4.5), None, Some(6.0)],
        ]
        .unwrap()
    }

    fn both_engines() -> Vec<Box<dyn Table>> {
        vec![
            Box::new(EagerTable::new(sample_df(), None)),
            Box::new(LazyTable::new(sample_df().lazy()).unwrap()),
        ]
    }

    #[test]
    fn test_schema_and_height_agree() {
        for table in both_engines() {
            assert_eq!(table.height(), 6);
            assert_eq!(table.column_names().unwrap(), vec!["id", "city", "score"]);
        }
    }

    #[test]
    fn test_sample_is_bounded() {
        for table in both_engines() {
            assert_eq!(table.sample(4).unwrap().height(), 4);
            assert_eq!(table.sample(100).unwrap().height(), 6);
        }
    }

    #[test]
    fn test_engines_sample_the_same_rows() {
        let tables = both_engines();
        let eager = tables[0].sample(3).unwrap();
        let lazy = tables[1].sample(3).unwrap();
        assert!(eager.equals_missing(&lazy));
        assert!(eager.equals_missing(&sample_df().head(Some(3))));
    }

    #[test]
    fn test_aggregate_null_counts() {
        for table in both_engines() {
            let out = table
                .aggregate(vec![col("score").null_count().alias("nulls")])
                .unwrap();
            let nulls = out
                .column("nulls")
                .unwrap()
                .as_materialized_series()
                .cast(&DataType::UInt64)
                .unwrap();
            assert_eq!(nulls.u64().unwrap().get(0), Some(2));
        }
    }

    #[test]
    fn test_modes_in_one_pass() {
        let lazy = LazyTable::new(sample_df().lazy()).unwrap();
        let before = lazy.full_passes();
        let tables: Vec<Box<dyn Table>> =
            vec![Box::new(EagerTable::new(sample_df(), None)), Box::new(lazy)];

        for table in tables {
            let modes = table
                .modes(&["city".to_string(), "id".to_string()])
                .unwrap();
            // Oslo and Rome tie on two rows each
            assert_eq!(modes["city"], "Oslo");
            assert_eq!(modes["id"], "1");
            if table.materialized().is_none() {
                assert_eq!(table.full_passes(), before + 1);
            }
        }
    }

    #[test]
    fn test_with_columns_keeps_rows() {
        for table in both_engines() {
            let table = table
                .with_columns(vec![col("score").fill_null(lit(0.0))])
                .unwrap();
            let df = table.collect().unwrap();
            assert_eq!(df.height(), 6);
            assert_eq!(df.column("score").unwrap().null_count(), 0);
        }
    }

    #[test]
    fn test_lazy_counts_full_passes() {
        let table = LazyTable::new(sample_df().lazy()).unwrap();
        assert_eq!(table.full_passes(), 1);
        table
            .aggregate(vec![col("score").median().alias("m")])
            .unwrap();
        assert_eq!(table.full_passes(), 2);
        table.sample(2).unwrap();
        assert_eq!(table.full_passes(), 2);
    }

    #[test]
    fn test_eager_budget_raises_resource_exhausted() {
        let table: Box<dyn Table> = Box::new(EagerTable::new(sample_df(), Some(1)));
        let result = table.with_columns(vec![lit(1i32).alias("one")]);
        match result {
            Err(err) => assert!(err.is_resource_exhausted()),
            Ok(_) => panic!("expected the budget to be exceeded"),
        }
    }

    #[test]
    fn test_only_eager_is_materialized() {
        let tables = both_engines();
        assert!(tables[0].materialized().is_some());
        assert!(tables[1].materialized().is_none());
    }
}
