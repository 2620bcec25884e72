//! Error types for the pipeline and the report assembler.
//!
//! Configuration problems are caught before any output is touched; a failure
//! inside a phase aborts the whole run. Data-quality anomalies (bad dates,
//! negative durations, out-of-range severities) never surface here: the
//! phases coerce or drop them.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::pipeline::Phase;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("input file {0:?} does not exist")]
    MissingInput(PathBuf),
    #[error("invalid cutoff date '{0}' (expected YYYY-MM-DD)")]
    InvalidCutoff(String),
    #[error("window size must be greater than zero")]
    InvalidWindowSize,
    #[error("unknown encoding '{0}'")]
    UnknownEncoding(String),
    #[error("output {0:?} would overwrite the input")]
    OutputIsInput(PathBuf),
}

#[derive(Debug, Error)]
#[error("failed to decode text with encoding {encoding}")]
pub struct DecodeError {
    pub encoding: &'static str,
}

#[derive(Debug, Error)]
#[error("{phase} phase failed: {message}")]
pub struct PhaseError {
    pub phase: Phase,
    pub message: String,
}

impl PhaseError {
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("window {window}: {source}")]
    Transform {
        window: usize,
        #[source]
        source: PhaseError,
    },
    #[error("window {window} produced columns {found:?}, expected {expected:?}")]
    SchemaDrift {
        window: usize,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("{context} {path:?}: {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl PipelineError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        PipelineError::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("no rows available to report in {path:?}")]
    NoData { path: PathBuf },
    #[error("{context} {path:?}: {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("reading {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("serializing statistics: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReportError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        ReportError::Io {
            context,
            path: path.into(),
            source,
        }
    }
}
