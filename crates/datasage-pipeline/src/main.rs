//! CLI entry point for the DataSage pipeline.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use datasage_pipeline::steps::{ColumnNormalizer, SchemaAnalyzer};
use datasage_pipeline::{
    DatasetLoader, FormatDescriptor, LoadOptions, Pipeline, PipelineConfig, PipelineStep,
    ProcessOptions, ProcessedDataset, QualityLabel, compress_for_agents, processing_narrative,
};
use dotenv::dotenv;
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    author = "DataSage Team",
    version,
    about = "Dataset profiling and preprocessing pipeline",
    long_about = "Loads a tabular file, runs the preprocessing steps and writes the cleaned \
                  table, its profile and the audit log.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  RUST_LOG              Overrides --log-level when set\n\n\
                  EXAMPLES:\n  \
                  # Basic usage\n  \
                  datasage-pipeline -i data.csv\n\n  \
                  # Healthcare sanity rules and a custom output directory\n  \
                  datasage-pipeline -i patients.csv --domain healthcare -o results/\n\n  \
                  # Preview roles without processing\n  \
                  datasage-pipeline -i data.csv --dry-run\n\n  \
                  # Compressed profile on stdout\n  \
                  datasage-pipeline -i data.csv --json | jq .dataset_quality_score"
)]
struct Args {
    /// Path to the dataset (csv, tsv, txt, json, parquet, xlsx, xls or zip)
    #[arg(short, long)]
    input: String,

    /// Domain tag selecting role overrides and sanity rules
    #[arg(long, default_value = "general")]
    domain: String,

    /// Output directory for results
    #[arg(short, long, default_value = "./outputs")]
    output: String,

    /// JSON file with pipeline thresholds
    ///
    /// Missing fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Preview detected roles without processing
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,

    /// Print the compressed profile as JSON to stdout instead of a summary
    ///
    /// Disables all progress logs.
    #[arg(long)]
    json: bool,

    /// With --json, print the full profile instead of the compressed one
    #[arg(long, requires = "json")]
    full_profile: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    dotenv().ok();

    let input = Path::new(&args.input);
    if !input.exists() {
        return Err(anyhow!("Input file not found: {}", args.input));
    }

    let config = load_config(args.config.as_deref())?;
    let descriptor = FormatDescriptor::sniff(input)?;
    info!(
        "Detected {} format (delimiter {:?}, encoding {})",
        descriptor.format,
        descriptor.delimiter.map(char::from),
        descriptor.encoding
    );

    if args.dry_run {
        return run_dry_run(&args, config, &descriptor);
    }

    if !Path::new(&args.output).exists() {
        fs::create_dir_all(&args.output)?;
        info!("Created output directory: {}", args.output);
    }

    let mut builder = Pipeline::builder().config(config);
    if !args.quiet && !args.json {
        builder = builder.on_progress(|update| {
            info!(
                "[{:.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        });
    }
    let pipeline = builder.build()?;

    let processed = pipeline
        .process_file(
            input,
            &descriptor,
            ProcessOptions::default().domain(&args.domain),
        )
        .map_err(|e| {
            error!("Pipeline failed: {}", e);
            anyhow!("Pipeline failed: [{}] {}", e.error_code(), e)
        })?;

    let stem = extract_file_stem(&args.input);
    let written = write_outputs(&processed, Path::new(&args.output), &stem)?;

    if args.json {
        let json = if args.full_profile {
            serde_json::to_string_pretty(&processed.profile)?
        } else {
            serde_json::to_string_pretty(&compress_for_agents(&processed.profile))?
        };
        println!("{json}");
        return Ok(());
    }

    print_human_readable_summary(&processed, &args, &written);
    Ok(())
}

/// Read thresholds from a JSON file, or use the defaults.
fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: PipelineConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    config.validate()?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write the cleaned table, the profiles and the audit log.
fn write_outputs(processed: &ProcessedDataset, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
    let clean_path = dir.join(format!("{stem}_clean.parquet"));
    let mut cleaned = processed.cleaned.clone();
    ParquetWriter::new(File::create(&clean_path)?)
        .finish(&mut cleaned)
        .with_context(|| format!("Failed to write {}", clean_path.display()))?;

    let profile_path = dir.join(format!("{stem}_profile.json"));
    fs::write(
        &profile_path,
        serde_json::to_string_pretty(&processed.profile)?,
    )?;

    let compressed_path = dir.join(format!("{stem}_compressed.json"));
    fs::write(
        &compressed_path,
        serde_json::to_string_pretty(&compress_for_agents(&processed.profile))?,
    )?;

    let logs_path = dir.join(format!("{stem}_logs.json"));
    fs::write(&logs_path, serde_json::to_string_pretty(&processed.logs)?)?;

    for path in [&clean_path, &profile_path, &compressed_path, &logs_path] {
        info!("Wrote {}", path.display());
    }
    Ok(vec![clean_path, profile_path, compressed_path, logs_path])
}

/// Run dry-run mode: load, normalize names and infer roles, then stop.
///
/// Uses `println!` on purpose; the preview is the output of --dry-run and
/// must show regardless of the log level.
fn run_dry_run(args: &Args, config: PipelineConfig, descriptor: &FormatDescriptor) -> Result<()> {
    let path = Path::new(&args.input);
    let loaded = DatasetLoader::new(config.clone()).load(path, descriptor, LoadOptions::default())?;

    let steps: Vec<Box<dyn PipelineStep>> =
        vec![Box::new(ColumnNormalizer), Box::new(SchemaAnalyzer)];
    let pipeline = Pipeline::builder().config(config).steps(steps).build()?;
    let mut ctx = pipeline.context(
        extract_file_stem(&args.input),
        &args.domain,
        loaded.execution_engine,
    );
    ctx.warnings.extend(loaded.warnings);
    let outcome = pipeline.run(loaded.table, &mut ctx)?;
    let schema = outcome.table.schema()?;

    println!("\n{}", "=".repeat(80));
    println!("DRY RUN - Preview of detected schema");
    println!("{}\n", "=".repeat(80));

    println!("DATASET OVERVIEW");
    println!("{}", "-".repeat(40));
    println!("  File: {}", args.input);
    println!("  Format: {}", descriptor.format);
    println!("  Rows: {}", loaded.row_count);
    println!("  Columns: {}", loaded.col_count);
    println!("  Estimated memory: {:.2} MB", loaded.memory_usage_mb);
    println!("  Engine: {}", ctx.engine);
    println!("  Domain: {}", ctx.domain);
    println!();

    println!("COLUMN ROLES");
    println!("{}", "-".repeat(40));
    println!("{:<30} {:<16} {:<16}", "Column", "Type", "Role");
    println!("{}", "-".repeat(62));
    for (name, dtype) in &schema {
        println!(
            "{:<30} {:<16} {:<16}",
            truncate_str(name, 29),
            truncate_str(&dtype.to_string(), 15),
            ctx.role(name)
        );
    }
    println!();

    let renames = processing_narrative(&outcome.logs);
    if !renames.is_empty() {
        println!("PLANNED CHANGES");
        println!("{}", "-".repeat(40));
        for line in renames.iter().filter(|l| l.starts_with("Renamed")) {
            println!("  - {line}");
        }
        println!();
    }

    if !ctx.warnings.is_empty() {
        println!("WARNINGS");
        println!("{}", "-".repeat(40));
        for warning in &ctx.warnings {
            println!("  ! {warning}");
        }
        println!();
    }

    let stem = extract_file_stem(&args.input);
    println!("OUTPUT FILES (will be created)");
    println!("{}", "-".repeat(40));
    for suffix in ["clean.parquet", "profile.json", "compressed.json", "logs.json"] {
        println!("  - {}/{}_{}", args.output, stem, suffix);
    }
    println!();

    println!("{}", "=".repeat(80));
    println!("To execute this preprocessing, run without --dry-run");
    println!("{}", "=".repeat(80));

    Ok(())
}

/// Truncate a string to max length with ellipsis
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Extract the file stem (name without extension) from a path.
fn extract_file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string()
}

/// Print a human-readable summary of the run.
///
/// This is the default output when `--json` is not given.
fn print_human_readable_summary(processed: &ProcessedDataset, args: &Args, written: &[PathBuf]) {
    let profile = &processed.profile;
    let score = profile.dataset_quality_score;

    println!();
    println!("{}", "=".repeat(80));
    println!("PREPROCESSING COMPLETE");
    println!("{}", "=".repeat(80));
    println!();

    println!(
        "Input:  {} ({} rows x {} columns)",
        args.input, profile.shape.rows, profile.shape.cols
    );
    println!("Engine: {}", processed.engine);
    println!("Domain: {}", profile.domain);
    println!(
        "Quality: {:.1}/100 ({})",
        score,
        QualityLabel::from_score(score)
    );
    println!();

    if !profile.potential_target_columns.is_empty() {
        println!(
            "Potential targets: {}",
            profile.potential_target_columns.join(", ")
        );
    }
    if !profile.high_correlations.is_empty() {
        println!("High correlations:");
        for pair in &profile.high_correlations {
            println!(
                "  - {} ~ {} ({:.3})",
                pair.col1, pair.col2, pair.correlation
            );
        }
    }
    println!();

    let narrative = processing_narrative(&processed.logs);
    if !narrative.is_empty() {
        println!("Actions Taken:");
        for line in narrative.iter().take(10) {
            println!("  - {line}");
        }
        if narrative.len() > 10 {
            println!("  ... and {} more actions", narrative.len() - 10);
        }
        println!();
    }

    if !processed.warnings.is_empty() {
        println!("Warnings:");
        for warning in &processed.warnings {
            println!("  ! {warning}");
        }
        println!();
    }

    println!("Outputs:");
    for path in written {
        println!("  - {}", path.display());
    }
    println!();
    println!("Use --json for machine-readable output");
    println!("{}", "=".repeat(80));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("age", 10), "age");
        assert_eq!(truncate_str("a_very_long_column_name", 10), "a_very_...");
    }

    #[test]
    fn test_extract_file_stem() {
        assert_eq!(extract_file_stem("data/patients.csv"), "patients");
        assert_eq!(extract_file_stem(""), "output");
    }

    #[test]
    fn test_load_config_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "zscore_threshold": 3.0 }"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.zscore_threshold, 3.0);
        assert_eq!(config.iqr_multiplier, 3.0);
    }
}
