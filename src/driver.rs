//! Windowed read, transform, and append-mode write.
//!
//! The driver is the only owner of the output handle and the statistics
//! accumulator for a run. Windows are processed strictly in sequence and each
//! one is released before the next is read, so peak memory is bounded by the
//! window size rather than the input size.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{self, BufWriter, Read},
    path::{Path, PathBuf},
};

use encoding_rs::Encoding;
use log::{debug, info};
use serde::Serialize;

use crate::{
    error::{ConfigError, PipelineError},
    fields::{FieldBindings, TIME_FEATURES},
    data::SourceType,
    frame::{Frame, TypeCandidate},
    io_utils::{self, DEFAULT_CSV_DELIMITER},
    pipeline::{Phase, Pipeline, PipelineConfig},
};

pub const DEFAULT_WINDOW_SIZE: usize = 2_600_000;
pub const OUTPUT_SUFFIX: &str = "-final.csv";
/// Records scanned to settle column types; zero scans the whole input.
pub const DEFAULT_SCHEMA_SAMPLE_ROWS: usize = 0;

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub window_size: usize,
    /// Records scanned to settle column types before the first window (0 means full scan).
    pub schema_sample_rows: usize,
    /// Input delimiter; resolved from the input extension when unset.
    pub delimiter: Option<u8>,
    /// Input encoding label; UTF-8 when unset.
    pub encoding: Option<String>,
    pub pipeline: PipelineConfig,
}

impl DriverConfig {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            window_size: DEFAULT_WINDOW_SIZE,
            schema_sample_rows: DEFAULT_SCHEMA_SAMPLE_ROWS,
            delimiter: None,
            encoding: None,
            pipeline: PipelineConfig::default(),
        }
    }

    /// Checks everything that can be checked before the output is touched and
    /// returns the resolved input encoding.
    pub fn validate(&self) -> Result<&'static Encoding, ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::InvalidWindowSize);
        }
        if !self.input.is_file() {
            return Err(ConfigError::MissingInput(self.input.clone()));
        }
        if same_file(&self.input, &self.output) {
            return Err(ConfigError::OutputIsInput(self.output.clone()));
        }
        io_utils::resolve_encoding(self.encoding.as_deref())
    }

    pub fn input_delimiter(&self) -> u8 {
        io_utils::resolve_input_delimiter(&self.input, self.delimiter)
    }
}

/// `<stem>-final.csv` beside the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}{OUTPUT_SUFFIX}"))
}

fn same_file(left: &Path, right: &Path) -> bool {
    match (fs::canonicalize(left), fs::canonicalize(right)) {
        (Ok(left), Ok(right)) => left == right,
        _ => left == right,
    }
}

/// Run statistics, mutated only by [`run`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingStats {
    pub chunks_processed: usize,
    pub total_rows_input: usize,
    pub total_rows_output: usize,
    /// Configured drop-list columns found in the first window's header.
    pub columns_deleted: Vec<String>,
    pub time_features_added: usize,
    pub rows_removed_by_phase: BTreeMap<Phase, usize>,
    /// Header of the written output; empty when no window produced rows.
    pub output_columns: Vec<String>,
}

impl ProcessingStats {
    pub fn rows_removed(&self) -> usize {
        self.total_rows_input - self.total_rows_output
    }

    pub fn removed_by(&self, phase: Phase) -> usize {
        self.rows_removed_by_phase.get(&phase).copied().unwrap_or(0)
    }
}

/// Yields consecutive windows of at most `window_size` records as frames.
pub struct WindowReader<R: Read> {
    reader: csv::Reader<R>,
    headers: Vec<String>,
    column_types: Option<Vec<SourceType>>,
    encoding: &'static Encoding,
    window_size: usize,
    record: csv::ByteRecord,
    exhausted: bool,
}

impl<R: Read> WindowReader<R> {
    pub fn new(
        mut reader: csv::Reader<R>,
        encoding: &'static Encoding,
        window_size: usize,
    ) -> Result<Self, PipelineError> {
        let headers = io_utils::reader_headers(&mut reader, encoding)?;
        Ok(Self {
            reader,
            headers,
            column_types: None,
            encoding,
            window_size: window_size.max(1),
            record: csv::ByteRecord::new(),
            exhausted: false,
        })
    }

    /// Parses every window with `types` instead of inferring per window.
    pub fn with_column_types(mut self, types: Vec<SourceType>) -> Self {
        self.column_types = Some(types);
        self
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn build_frame(&self, records: Vec<Vec<String>>) -> Frame {
        match &self.column_types {
            Some(types) => Frame::from_typed_records(&self.headers, types, records),
            None => Frame::from_records(&self.headers, records),
        }
    }

    fn read_window(&mut self) -> Result<Vec<Vec<String>>, PipelineError> {
        let mut records = Vec::with_capacity(self.window_size.min(64 * 1024));
        while records.len() < self.window_size {
            if !self.reader.read_byte_record(&mut self.record)? {
                self.exhausted = true;
                break;
            }
            records.push(io_utils::decode_record(&self.record, self.encoding)?);
        }
        Ok(records)
    }
}

impl<R: Read> Iterator for WindowReader<R> {
    type Item = Result<Frame, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        match self.read_window() {
            Ok(records) if records.is_empty() => None,
            Ok(records) => Some(Ok(self.build_frame(records))),
            Err(err) => {
                self.exhausted = true;
                Some(Err(err))
            }
        }
    }
}

/// Output file created lazily with the first non-empty window's header.
struct WindowSink<'a> {
    path: &'a Path,
    writer: Option<csv::Writer<BufWriter<File>>>,
    header: Vec<String>,
}

impl<'a> WindowSink<'a> {
    fn new(path: &'a Path) -> Self {
        Self {
            path,
            writer: None,
            header: Vec::new(),
        }
    }

    fn write(&mut self, window: usize, frame: &Frame) -> Result<(), PipelineError> {
        let names = frame.column_names();
        if self.writer.is_none() {
            let mut writer = io_utils::open_csv_file_writer(self.path, DEFAULT_CSV_DELIMITER)?;
            writer.write_record(&names)?;
            info!("Created {:?} with {} column(s)", self.path, names.len());
            self.header = names;
            self.writer = Some(writer);
        } else if names != self.header {
            return Err(PipelineError::SchemaDrift {
                window,
                expected: self.header.clone(),
                found: names,
            });
        }
        if let Some(writer) = self.writer.as_mut() {
            for row in 0..frame.row_count() {
                writer.write_record(frame.row_cells(row))?;
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<String>, PipelineError> {
        if let Some(mut writer) = self.writer {
            writer
                .flush()
                .map_err(|err| PipelineError::io("flushing output", self.path, err))?;
        }
        Ok(self.header)
    }
}

/// Settles one source type per input column from the first `sample_rows`
/// records (all of them when zero).
pub fn infer_column_types(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
    sample_rows: usize,
) -> Result<Vec<SourceType>, PipelineError> {
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)?;
    let mut candidates = vec![TypeCandidate::default(); headers.len()];
    let mut record = csv::ByteRecord::new();
    let mut processed = 0usize;
    while reader.read_byte_record(&mut record)? {
        if sample_rows > 0 && processed >= sample_rows {
            break;
        }
        let cells = io_utils::decode_record(&record, encoding)?;
        for (candidate, cell) in candidates.iter_mut().zip(&cells) {
            candidate.observe(cell);
        }
        processed += 1;
    }
    let types = candidates
        .iter()
        .map(TypeCandidate::resolve)
        .collect::<Vec<_>>();
    for (name, dtype) in headers.iter().zip(&types) {
        debug!("Column {name:?} reads as {}", dtype.label());
    }
    info!("Settled column types from {processed} record(s)");
    Ok(types)
}

fn remove_existing_output(path: &Path) -> Result<(), PipelineError> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!("Removed existing output {path:?}");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(PipelineError::io("removing existing output", path, err)),
    }
}

/// Runs every window of the input through the pipeline and appends the
/// survivors to the output file.
pub fn run(config: &DriverConfig) -> Result<ProcessingStats, PipelineError> {
    let encoding = config.validate()?;
    let delimiter = config.input_delimiter();
    info!(
        "Preprocessing {:?} -> {:?} (window size {}, cutoff {}, delimiter '{}')",
        config.input,
        config.output,
        config.window_size,
        config.pipeline.date_cutoff,
        io_utils::printable_delimiter(delimiter)
    );
    remove_existing_output(&config.output)?;

    let total_records = io_utils::count_data_lines(&config.input)
        .map_err(|err| PipelineError::io("counting records in", &config.input, err))?;
    let expected_windows = total_records.div_ceil(config.window_size);
    info!("Input holds about {total_records} record(s) in {expected_windows} window(s)");

    let column_types =
        infer_column_types(&config.input, delimiter, encoding, config.schema_sample_rows)?;
    let reader = io_utils::open_csv_reader_from_path(&config.input, delimiter)?;
    let windows =
        WindowReader::new(reader, encoding, config.window_size)?.with_column_types(column_types);
    let headers = windows.headers().to_vec();
    let bindings = FieldBindings::resolve(&headers, &config.pipeline);
    let pipeline = Pipeline::new(config.pipeline.clone(), bindings);

    let mut stats = ProcessingStats {
        columns_deleted: headers
            .iter()
            .filter(|h| config.pipeline.drop_columns.contains(h))
            .cloned()
            .collect(),
        time_features_added: if pipeline.bindings().start_time.is_some() {
            TIME_FEATURES.len()
        } else {
            0
        },
        ..ProcessingStats::default()
    };
    let mut sink = WindowSink::new(&config.output);

    for (idx, window) in windows.enumerate() {
        let number = idx + 1;
        let mut frame = window?;
        let rows_in = frame.row_count();
        for phase in Phase::ALL {
            let before = frame.row_count();
            frame = pipeline
                .apply(phase, frame)
                .map_err(|source| PipelineError::Transform {
                    window: number,
                    source,
                })?;
            let removed = before - frame.row_count();
            if removed > 0 {
                debug!("Window {number}: {phase} removed {removed} row(s)");
            }
            *stats.rows_removed_by_phase.entry(phase).or_insert(0) += removed;
        }
        let rows_out = frame.row_count();

        stats.chunks_processed += 1;
        stats.total_rows_input += rows_in;
        stats.total_rows_output += rows_out;
        if rows_out == 0 {
            info!("Window {number}/{expected_windows}: {rows_in} row(s) in, none kept");
        } else {
            sink.write(number, &frame)?;
            info!("Window {number}/{expected_windows}: {rows_in} row(s) in, {rows_out} written");
        }
        drop(frame);
    }

    stats.output_columns = sink.finish()?;
    info!(
        "Processed {} window(s): {} row(s) in, {} row(s) out",
        stats.chunks_processed, stats.total_rows_input, stats.total_rows_output
    );
    Ok(stats)
}
