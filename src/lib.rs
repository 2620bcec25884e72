pub mod cli;
pub mod data;
pub mod driver;
pub mod error;
pub mod fields;
pub mod frame;
pub mod io_utils;
pub mod pipeline;
pub mod profile;
pub mod report;
pub mod table;
pub mod types;

use std::{env, fs, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use encoding_rs::Encoding;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{AnalyzeArgs, Cli, Commands, ConvertArgs, InputArgs, PreprocessArgs},
    driver::DriverConfig,
    error::ReportError,
    pipeline::{DEFAULT_DROP_COLUMNS, PipelineConfig},
    report::{
        ANALYSIS_REPORT_SUFFIX, AnalysisReport, CONVERSION_REPORT_SUFFIX, DatasetSample,
        PREPROCESS_REPORT_SUFFIX, PreprocessInputs, PreprocessReport, TypeConversionReport,
    },
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("accident_etl", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Preprocess(args) => handle_preprocess(&args),
        Commands::Analyze(args) => handle_analyze(&args),
        Commands::Convert(args) => handle_convert(&args),
    }
}

fn handle_preprocess(args: &PreprocessArgs) -> Result<()> {
    let config = driver_config(args)?;
    debug!("Driver configuration: {config:?}");
    let stats = driver::run(&config)
        .with_context(|| format!("Preprocessing {:?}", config.input))?;

    if let Some(path) = &args.stats_json {
        let json = serde_json::to_string_pretty(&stats).map_err(ReportError::from)?;
        fs::write(path, json).with_context(|| format!("Writing statistics to {path:?}"))?;
        info!("Statistics written to {path:?}");
    }

    let encoding = io_utils::resolve_encoding(args.source.input_encoding.as_deref())?;
    let before = DatasetSample::load(
        &config.input,
        args.sample_rows,
        config.input_delimiter(),
        encoding,
    )
    .with_context(|| format!("Sampling {:?}", config.input))?;
    if !config.output.exists() {
        warn!(
            "No records survived preprocessing; {:?} was not written and reports are skipped",
            config.output
        );
        return Ok(());
    }
    let after = DatasetSample::load(
        &config.output,
        args.sample_rows,
        io_utils::DEFAULT_CSV_DELIMITER,
        encoding_rs::UTF_8,
    )
    .with_context(|| format!("Sampling {:?}", config.output))?;

    let report_path = report::report_path(&config.input, PREPROCESS_REPORT_SUFFIX);
    let assembled = PreprocessReport::assemble(PreprocessInputs {
        config: &config,
        stats: &stats,
        before: &before,
        after: &after,
    });
    if let Some(report) = skip_when_empty(assembled)? {
        report
            .write_to(&report_path)
            .with_context(|| format!("Writing report {report_path:?}"))?;
    }

    let conversion_path = report::report_path(&config.output, CONVERSION_REPORT_SUFFIX);
    let assembled = TypeConversionReport::assemble(&after, report::DEFAULT_TABLE_NAME);
    if let Some(report) = skip_when_empty(assembled)? {
        report
            .write_to(&conversion_path)
            .with_context(|| format!("Writing report {conversion_path:?}"))?;
    }
    info!(
        "Preprocessing complete: {} of {} row(s) kept in {:?}",
        stats.total_rows_output, stats.total_rows_input, config.output
    );
    Ok(())
}

fn handle_analyze(args: &AnalyzeArgs) -> Result<()> {
    let sample = load_sample(&args.source, args.sample_rows)?;
    let report_path = report::report_path(&args.source.input, ANALYSIS_REPORT_SUFFIX);
    if let Some(report) = skip_when_empty(AnalysisReport::assemble(&sample))? {
        info!(
            "Quality score for {:?}: {:.1}/100 ({})",
            args.source.input,
            report.quality_score(),
            report.quality_level()
        );
        report
            .write_to(&report_path)
            .with_context(|| format!("Writing report {report_path:?}"))?;
    }
    Ok(())
}

fn handle_convert(args: &ConvertArgs) -> Result<()> {
    let sample = load_sample(&args.source, args.sample_rows)?;
    let report_path = report::report_path(&args.source.input, CONVERSION_REPORT_SUFFIX);
    let assembled = TypeConversionReport::assemble(&sample, &args.table_name);
    if let Some(report) = skip_when_empty(assembled)? {
        report
            .write_to(&report_path)
            .with_context(|| format!("Writing report {report_path:?}"))?;
    }
    Ok(())
}

fn driver_config(args: &PreprocessArgs) -> Result<DriverConfig> {
    let input = &args.source.input;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| driver::default_output_path(input));
    let drop_columns = if args.drop_columns.is_empty() {
        DEFAULT_DROP_COLUMNS.iter().map(|c| c.to_string()).collect()
    } else {
        args.drop_columns
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string())
            .collect()
    };
    let pipeline = PipelineConfig {
        start_column: args.start_column.clone(),
        end_column: args.end_column.clone(),
        drop_columns,
        date_cutoff: PipelineConfig::parse_cutoff(&args.date_cutoff)?,
        max_string_length: args.max_string_length,
        deduplicate: !args.no_dedup,
    };
    Ok(DriverConfig {
        input: input.clone(),
        output,
        window_size: args.window_size,
        schema_sample_rows: args.schema_sample_rows,
        delimiter: args.source.delimiter,
        encoding: args.source.input_encoding.clone(),
        pipeline,
    })
}

fn load_sample(source: &InputArgs, sample_rows: usize) -> Result<DatasetSample> {
    let input = &source.input;
    if !input.is_file() {
        return Err(error::ConfigError::MissingInput(input.clone()).into());
    }
    let encoding: &'static Encoding = io_utils::resolve_encoding(source.input_encoding.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(input, source.delimiter);
    info!(
        "Sampling up to {sample_rows} row(s) from '{}' with delimiter '{}'",
        input.display(),
        io_utils::printable_delimiter(delimiter)
    );
    DatasetSample::load(input, sample_rows, delimiter, encoding)
        .with_context(|| format!("Sampling {input:?}"))
}

/// Turns "nothing to report" into a warning; every other report error propagates.
fn skip_when_empty<T>(result: Result<T, ReportError>) -> Result<Option<T>> {
    match result {
        Ok(report) => Ok(Some(report)),
        Err(ReportError::NoData { path }) => {
            warn!("Skipping report: {path:?} has no rows to describe");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}
