//! Cell values and source-type tags.
//!
//! A row window stores cells as `Option<Value>`; `None` is a null cell. Each
//! column also carries a [`SourceType`] describing the runtime representation
//! of its values, which is what the type mapper dispatches on.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Tokens read as null when a CSV window is materialized.
pub const NA_TOKENS: &[&str] = &["NA", "N/A", "NaN", "nan", "null", "NULL", "None", "#N/A"];

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Value::Boolean(true) => "True".to_string(),
            Value::Boolean(false) => "False".to_string(),
            Value::String(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Numeric view used by statistics and validation; booleans count as 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Runtime value-type tag of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceType {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Boolean,
    String,
    Category,
    DateTime,
    Date,
    Duration,
    Unknown,
}

impl SourceType {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            SourceType::Int8 | SourceType::Int16 | SourceType::Int32 | SourceType::Int64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, SourceType::Float32 | SourceType::Float64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float() || self == SourceType::Boolean
    }

    pub fn is_text(self) -> bool {
        matches!(self, SourceType::String | SourceType::Category)
    }

    /// Dataframe-style label used in reports.
    pub fn label(self) -> &'static str {
        match self {
            SourceType::Int8 => "int8",
            SourceType::Int16 => "int16",
            SourceType::Int32 => "int32",
            SourceType::Int64 => "int64",
            SourceType::Float32 => "float32",
            SourceType::Float64 => "float64",
            SourceType::Boolean => "bool",
            SourceType::String => "object",
            SourceType::Category => "category",
            SourceType::DateTime => "datetime64[ns]",
            SourceType::Date => "date",
            SourceType::Duration => "timedelta64[ns]",
            SourceType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn is_na_token(value: &str) -> bool {
    value.is_empty() || NA_TOKENS.contains(&value)
}

pub fn parse_boolean_token(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y"];
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

/// Parses a timestamp cell, accepting date-only values as midnight.
pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| parse_naive_date(value).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Timestamp view of a cell, parsing text cells on demand.
pub fn value_as_datetime(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::DateTime(dt) => Some(*dt),
        Value::Date(d) => d.and_hms_opt(0, 0, 0),
        Value::String(s) => parse_naive_datetime(s),
        _ => None,
    }
}
