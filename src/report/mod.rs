//! Text reports built from run statistics and column profiles.
//!
//! Every report is assembled into a value first and rendered second, so a
//! caller can tell "nothing to report" ([`ReportError::NoData`]) apart from a
//! failure to read or write.

mod analysis;
mod conversion;
mod preprocess;

pub use analysis::{AnalysisReport, MissingBands, QualityLevel, quality_score};
pub use conversion::{DEFAULT_TABLE_NAME, TypeConversionReport, create_table_script};
pub use preprocess::{PreprocessInputs, PreprocessReport};

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDateTime};
use encoding_rs::Encoding;
use log::info;

use crate::{error::ReportError, frame::Frame, io_utils};

pub const PREPROCESS_REPORT_SUFFIX: &str = "-preprocess_report.txt";
pub const CONVERSION_REPORT_SUFFIX: &str = "_type_conversion_report.txt";
pub const ANALYSIS_REPORT_SUFFIX: &str = "-analyze_report.txt";

pub const PREPROCESS_SAMPLE_ROWS: usize = 50_000;
pub const ANALYSIS_SAMPLE_ROWS: usize = 3_000_000;
pub const CONVERSION_SAMPLE_ROWS: usize = 10_000;

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The leading records of a CSV file plus whole-file facts.
#[derive(Debug, Clone)]
pub struct DatasetSample {
    pub path: PathBuf,
    pub frame: Frame,
    /// Data lines in the whole file, header excluded.
    pub total_rows: usize,
    pub file_size: u64,
}

impl DatasetSample {
    pub fn load(
        path: &Path,
        sample_rows: usize,
        delimiter: u8,
        encoding: &'static Encoding,
    ) -> Result<Self, ReportError> {
        let file = File::open(path).map_err(|err| ReportError::io("opening", path, err))?;
        let mut reader = io_utils::open_csv_reader(BufReader::new(file), delimiter);
        let csv_error = |source| ReportError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let headers = io_utils::decode_record(reader.byte_headers().map_err(csv_error)?, encoding)?;

        let mut records = Vec::new();
        let mut record = csv::ByteRecord::new();
        while records.len() < sample_rows && reader.read_byte_record(&mut record).map_err(csv_error)? {
            records.push(io_utils::decode_record(&record, encoding)?);
        }

        let total_rows = io_utils::count_data_lines(path)
            .map_err(|err| ReportError::io("counting records in", path, err))?;
        let file_size = io_utils::file_size(path).unwrap_or(0);
        info!(
            "Sampled {} of {total_rows} row(s) from {path:?} ({})",
            records.len(),
            format_file_size(file_size)
        );
        Ok(Self {
            path: path.to_path_buf(),
            frame: Frame::from_records(&headers, records),
            total_rows,
            file_size,
        })
    }

    pub fn sample_rows(&self) -> usize {
        self.frame.row_count()
    }

    pub fn memory_mb(&self) -> f64 {
        self.frame.estimated_memory_bytes() as f64 / (1024.0 * 1024.0)
    }

    /// Column count per source-type label.
    pub fn type_distribution(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for column in self.frame.columns() {
            *counts.entry(column.dtype.label()).or_insert(0) += 1;
        }
        counts
    }
}

/// `<dir>/<stem><suffix>` for a report derived from `path`.
pub fn report_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    path.with_file_name(format!("{stem}{suffix}"))
}

pub(crate) fn write_report(path: &Path, contents: &str) -> Result<(), ReportError> {
    fs::write(path, contents).map_err(|err| ReportError::io("writing report", path, err))?;
    info!("Report written to {path:?}");
    Ok(())
}

pub(crate) fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Megabytes below 1 GiB, gigabytes above.
pub fn format_file_size(bytes: u64) -> String {
    let mb = bytes as f64 / (1024.0 * 1024.0);
    if mb < 1024.0 {
        format!("{mb:.1} MB")
    } else {
        format!("{:.2} GB", mb / 1024.0)
    }
}

/// `part / whole` as a percentage; 0 when `whole` is 0.
pub fn percentage(part: f64, whole: f64) -> f64 {
    if whole == 0.0 { 0.0 } else { part / whole * 100.0 }
}

pub(crate) fn format_count(value: usize) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub(crate) fn format_metric(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{v:.0}"),
        Some(v) => format!("{v:.4}"),
        None => "N/A".to_string(),
    }
}

pub(crate) fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() > max_chars {
        let head = value.chars().take(max_chars).collect::<String>();
        format!("{head}...")
    } else {
        value.to_string()
    }
}

pub(crate) fn strings<const N: usize>(values: [&str; N]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
