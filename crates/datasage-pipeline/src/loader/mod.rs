//! Size-aware dataset loading.
//!
//! The loader turns a file plus its [`FormatDescriptor`] into a table backed
//! by the right execution engine:
//!
//! - archives are unpacked and their first entry re-sniffed
//! - workbooks are normalised to CSV
//! - non-UTF-8 text is transcoded
//! - files above the large-file threshold are scanned lazily
//! - a bounded dtype pre-pass narrows integers and converts low-cardinality strings
//!
//! Load failures (unreadable bytes) and validation failures (readable but
//! empty) surface as different [`PipelineError`] variants.

pub mod archive;
pub mod format;
pub mod sniff;

pub use format::{FileFormat, FormatDescriptor};
pub use sniff::{DtypeAdjustment, DtypePlan};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::table::{EagerTable, LazyTable, Table};
use crate::types::ExecutionEngine;
use archive::StagedFile;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MB: f64 = 1024.0 * 1024.0;

/// Per-load overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Skip size-based engine selection.
    pub force_engine: Option<ExecutionEngine>,
}

impl LoadOptions {
    pub fn force_engine(engine: ExecutionEngine) -> Self {
        Self {
            force_engine: Some(engine),
        }
    }
}

/// A loaded table and what the loader learned about it.
pub struct LoadedDataset {
    pub table: Box<dyn Table>,
    pub row_count: usize,
    pub col_count: usize,
    pub memory_usage_mb: f64,
    pub detected_dtypes: BTreeMap<String, String>,
    pub execution_engine: ExecutionEngine,
    pub warnings: Vec<String>,
}

impl std::fmt::Debug for LoadedDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedDataset")
            .field("row_count", &self.row_count)
            .field("col_count", &self.col_count)
            .field("memory_usage_mb", &self.memory_usage_mb)
            .field("execution_engine", &self.execution_engine)
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}

/// Pick the execution engine for a file of `file_size` bytes.
pub fn select_engine(file_size: u64, config: &PipelineConfig) -> ExecutionEngine {
    if file_size > config.large_file_threshold_bytes {
        ExecutionEngine::Partitioned
    } else {
        ExecutionEngine::InMemory
    }
}

/// Reads datasets from disk.
#[derive(Debug, Clone, Default)]
pub struct DatasetLoader {
    config: PipelineConfig,
}

impl DatasetLoader {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Load `path` as described by `descriptor`.
    pub fn load(
        &self,
        path: &Path,
        descriptor: &FormatDescriptor,
        options: LoadOptions,
    ) -> Result<LoadedDataset> {
        let mut warnings = Vec::new();
        let mut staged: Vec<StagedFile> = Vec::new();

        let metadata = fs::metadata(path)
            .map_err(|e| PipelineError::LoadFailed(format!("{}: {e}", path.display())))?;
        if metadata.len() == 0 {
            return Err(PipelineError::ValidationFailed("File is empty.".to_string()));
        }

        let (mut payload, descriptor) =
            self.resolve_payload(path, descriptor, &mut staged, &mut warnings)?;
        let payload_size = fs::metadata(&payload)?.len();
        if payload_size == 0 {
            return Err(PipelineError::ValidationFailed("File is empty.".to_string()));
        }

        let mut engine = options
            .force_engine
            .unwrap_or_else(|| select_engine(payload_size, &self.config));
        info!(
            "Loading {} ({} format, {:.2} MB) with the {} engine",
            path.display(),
            descriptor.format,
            payload_size as f64 / MB,
            engine
        );

        let mut eager = None;
        if engine == ExecutionEngine::InMemory {
            let low_memory = payload_size > self.config.low_memory_threshold_bytes;
            let df = self.with_encoding_fallback(
                &mut payload,
                &descriptor,
                &mut staged,
                &mut warnings,
                |p| self.read_eager(p, &descriptor, low_memory),
            )?;

            let over_budget = self
                .config
                .memory_budget_bytes
                .is_some_and(|budget| df.estimated_size() as u64 > budget);
            if over_budget {
                let message =
                    "Memory limit exceeded during eager load. Falling back to partitioned engine.";
                warn!("{}", message);
                warnings.push(message.to_string());
                engine = ExecutionEngine::Partitioned;
            } else {
                eager = Some(df);
            }
        }

        let table: Box<dyn Table> = match eager {
            Some(df) => Box::new(EagerTable::new(df, self.config.memory_budget_bytes)),
            None => {
                let lazy = self.with_encoding_fallback(
                    &mut payload,
                    &descriptor,
                    &mut staged,
                    &mut warnings,
                    |p| LazyTable::new(self.scan_lazy(p, &descriptor)?),
                )?;
                Box::new(lazy.keep_alive(staged.drain(..).map(|s| s.dir)))
            }
        };

        let col_count = table.schema()?.len();
        if col_count == 0 {
            return Err(PipelineError::ValidationFailed(
                "Dataset is empty or format unrecognized.".to_string(),
            ));
        }
        let row_count = table.height();
        if row_count == 0 {
            return Err(PipelineError::ValidationFailed(
                "File contains no rows.".to_string(),
            ));
        }

        let sample = table.sample(self.config.sniff_sample_rows)?;
        let table = match DtypePlan::from_sample(&sample, self.config.categorical_max_uniques) {
            Ok(plan) => {
                debug!("Dtype plan from sample: {:?}", plan.advisory_dtypes());
                plan.apply(table)?
            }
            Err(e) => {
                warnings.push(format!("Failed to sniff dtypes: {e}"));
                table
            }
        };

        let memory_usage_mb = match table.materialized() {
            Some(df) => df.estimated_size() as f64 / MB,
            None => {
                let sample = table.sample(self.config.sniff_sample_rows)?;
                if sample.height() == 0 {
                    0.0
                } else {
                    sample.estimated_size() as f64 * row_count as f64
                        / sample.height() as f64
                        / MB
                }
            }
        };

        let detected_dtypes = table
            .schema()?
            .into_iter()
            .map(|(name, dtype)| (name, dtype.to_string()))
            .collect();

        info!(
            "Loaded {} rows x {} columns ({:.2} MB, {} engine)",
            row_count, col_count, memory_usage_mb, engine
        );

        Ok(LoadedDataset {
            table,
            row_count,
            col_count,
            memory_usage_mb,
            detected_dtypes,
            execution_engine: engine,
            warnings,
        })
    }

    /// Unpack archives, convert workbooks and transcode legacy encodings.
    fn resolve_payload(
        &self,
        path: &Path,
        descriptor: &FormatDescriptor,
        staged: &mut Vec<StagedFile>,
        warnings: &mut Vec<String>,
    ) -> Result<(PathBuf, FormatDescriptor)> {
        let mut payload = path.to_path_buf();
        let mut descriptor = descriptor.clone();

        if descriptor.format == FileFormat::Zip {
            let extracted = archive::extract_first_entry(&payload)?;
            let sniffed = FormatDescriptor::sniff(&extracted.path)?;
            if sniffed.format == FileFormat::Zip {
                return Err(PipelineError::UnsupportedFormat(
                    "nested zip archive".to_string(),
                ));
            }
            debug!("Archive payload sniffed as {}", sniffed.format);
            payload = extracted.path.clone();
            descriptor = sniffed.with_encoding(descriptor.encoding);
            staged.push(extracted);
        }

        if descriptor.format == FileFormat::Excel {
            let converted = archive::workbook_to_csv(&payload)?;
            payload = converted.path.clone();
            descriptor = FormatDescriptor::new(FileFormat::Csv);
            staged.push(converted);
        }

        if !descriptor.is_utf8() && matches!(descriptor.format, FileFormat::Csv | FileFormat::Tsv | FileFormat::Json) {
            let transcoded = match archive::lookup_encoding(&descriptor.encoding) {
                Some(encoding) => {
                    debug!("Transcoding {} input to UTF-8", encoding.name());
                    archive::transcode_to_utf8(&payload, encoding)?
                }
                None => {
                    let message = fallback_warning(&descriptor.encoding);
                    warn!("{} (unknown encoding label)", message);
                    warnings.push(message);
                    archive::latin1_fallback(&payload)?
                }
            };
            payload = transcoded.path.clone();
            staged.push(transcoded);
        }

        Ok((payload, descriptor))
    }

    /// Run `read`, retrying once on a latin-1 copy if the payload is not valid UTF-8.
    ///
    /// On fallback `payload` is redirected to the copy so later reads of the
    /// same load reuse it.
    fn with_encoding_fallback<T>(
        &self,
        payload: &mut PathBuf,
        descriptor: &FormatDescriptor,
        staged: &mut Vec<StagedFile>,
        warnings: &mut Vec<String>,
        read: impl Fn(&Path) -> Result<T>,
    ) -> Result<T> {
        match read(payload.as_path()) {
            Ok(value) => Ok(value),
            Err(e) if descriptor.format.is_delimited() && !is_valid_utf8(payload.as_path()) => {
                let message = fallback_warning(&descriptor.encoding);
                warn!("{} ({})", message, e);
                warnings.push(message);

                let fallback = archive::latin1_fallback(payload)?;
                *payload = fallback.path.clone();
                staged.push(fallback);
                read(payload.as_path()).map_err(into_load_failure)
            }
            Err(e) => Err(into_load_failure(e)),
        }
    }

    fn read_eager(
        &self,
        path: &Path,
        descriptor: &FormatDescriptor,
        low_memory: bool,
    ) -> Result<DataFrame> {
        let df = match descriptor.format {
            FileFormat::Csv | FileFormat::Tsv => CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(self.config.sniff_sample_rows))
                .with_low_memory(low_memory)
                .with_parse_options(
                    CsvParseOptions::default()
                        .with_separator(descriptor.separator())
                        .with_quote_char(Some(b'"')),
                )
                .try_into_reader_with_file_path(Some(path.to_path_buf()))?
                .finish()?,
            FileFormat::Parquet => ParquetReader::new(File::open(path)?).finish()?,
            FileFormat::Json => read_json(path)?,
            FileFormat::Excel | FileFormat::Zip => {
                return Err(PipelineError::Internal(format!(
                    "{} payload reached the reader unnormalised",
                    descriptor.format
                )));
            }
        };
        Ok(df)
    }

    fn scan_lazy(&self, path: &Path, descriptor: &FormatDescriptor) -> Result<LazyFrame> {
        let lf = match descriptor.format {
            FileFormat::Csv | FileFormat::Tsv => LazyCsvReader::new(PlPath::Local(path.into()))
                .with_infer_schema_length(Some(self.config.sniff_sample_rows))
                .with_has_header(true)
                .with_separator(descriptor.separator())
                .with_low_memory(true)
                .finish()?,
            FileFormat::Parquet => LazyFrame::scan_parquet(PlPath::Local(path.into()), Default::default())?,
            // no deferred JSON reader; read once and plan over the frame
            FileFormat::Json => read_json(path)?.lazy(),
            FileFormat::Excel | FileFormat::Zip => {
                return Err(PipelineError::Internal(format!(
                    "{} payload reached the reader unnormalised",
                    descriptor.format
                )));
            }
        };
        Ok(lf)
    }
}

/// Newline-delimited JSON first, then a single JSON array.
fn read_json(path: &Path) -> Result<DataFrame> {
    let starts_with_array = fs::read(path)?
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'[');

    if !starts_with_array {
        let lines = JsonReader::new(File::open(path)?)
            .with_json_format(JsonFormat::JsonLines)
            .finish();
        match lines {
            Ok(df) => return Ok(df),
            Err(e) => debug!("Not newline-delimited JSON ({}), reading as an array", e),
        }
    }
    Ok(JsonReader::new(File::open(path)?).finish()?)
}

fn fallback_warning(encoding: &str) -> String {
    format!("Encoding '{encoding}' failed. Retrying with lossy latin-1 fallback")
}

fn is_valid_utf8(path: &Path) -> bool {
    fs::read(path)
        .map(|bytes| std::str::from_utf8(&bytes).is_ok())
        .unwrap_or(true)
}

fn into_load_failure(error: PipelineError) -> PipelineError {
    match error {
        PipelineError::Polars(e) => PipelineError::LoadFailed(e.to_string()),
        PipelineError::Io(e) => PipelineError::LoadFailed(e.to_string()),
        other => other,
    }
}
