use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    driver::{DEFAULT_SCHEMA_SAMPLE_ROWS, DEFAULT_WINDOW_SIZE},
    pipeline::{DEFAULT_DATE_CUTOFF, DEFAULT_END_COLUMN, DEFAULT_START_COLUMN},
    report::{
        ANALYSIS_SAMPLE_ROWS, CONVERSION_SAMPLE_ROWS, DEFAULT_TABLE_NAME, PREPROCESS_SAMPLE_ROWS,
    },
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Prepare US accident CSV data for a SQL Server warehouse",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the windowed transformation pipeline and write the comparison reports
    Preprocess(PreprocessArgs),
    /// Profile a CSV file and write a dataset analysis report
    Analyze(AnalyzeArgs),
    /// Map a CSV file's columns to SQL Server and SSIS types
    Convert(ConvertArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input CSV file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct PreprocessArgs {
    #[command(flatten)]
    pub source: InputArgs,
    /// Output CSV file (defaults to `<input stem>-final.csv` beside the input)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Records per processing window
    #[arg(long = "window-size", default_value_t = DEFAULT_WINDOW_SIZE)]
    pub window_size: usize,
    /// Records scanned to settle column types before windowing (0 means full scan)
    #[arg(long = "schema-sample-rows", default_value_t = DEFAULT_SCHEMA_SAMPLE_ROWS)]
    pub schema_sample_rows: usize,
    /// Keep records whose start time is on or after this date (YYYY-MM-DD)
    #[arg(long = "date-cutoff", default_value = DEFAULT_DATE_CUTOFF)]
    pub date_cutoff: String,
    /// Comma-separated columns to drop (defaults to identifier and administrative columns)
    #[arg(long = "drop-columns", value_delimiter = ',')]
    pub drop_columns: Vec<String>,
    /// Drop records with any text value longer than N characters
    #[arg(
        long = "max-string-length",
        num_args = 0..=1,
        default_missing_value = DEFAULT_STRING_LENGTH_LIMIT_ARG
    )]
    pub max_string_length: Option<usize>,
    /// Keep records that share rounded coordinates and hour
    #[arg(long = "no-dedup")]
    pub no_dedup: bool,
    /// Start timestamp column
    #[arg(long = "start-column", default_value = DEFAULT_START_COLUMN)]
    pub start_column: String,
    /// End timestamp column
    #[arg(long = "end-column", default_value = DEFAULT_END_COLUMN)]
    pub end_column: String,
    /// Rows sampled from input and output for the reports
    #[arg(long = "sample-rows", default_value_t = PREPROCESS_SAMPLE_ROWS)]
    pub sample_rows: usize,
    /// Also write run statistics as JSON to this path
    #[arg(long = "stats-json")]
    pub stats_json: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub source: InputArgs,
    /// Rows sampled for profiling
    #[arg(long = "sample-rows", default_value_t = ANALYSIS_SAMPLE_ROWS)]
    pub sample_rows: usize,
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub source: InputArgs,
    /// Rows sampled for profiling
    #[arg(long = "sample-rows", default_value_t = CONVERSION_SAMPLE_ROWS)]
    pub sample_rows: usize,
    /// Table name used in the CREATE TABLE script
    #[arg(long = "table-name", default_value = DEFAULT_TABLE_NAME)]
    pub table_name: String,
}

/// Threshold applied when `--max-string-length` is given without a value.
const DEFAULT_STRING_LENGTH_LIMIT_ARG: &str = "50";

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
