//! The ordered transformation phases applied to every row window.
//!
//! Phases are pure `Frame -> Frame` steps and must run in [`Phase::ALL`]
//! order: the date filter needs the start timestamp that time-feature
//! derivation later drops, validation looks columns up by their standardized
//! names, and reordering expects the final column set.

use std::{
    collections::HashSet,
    fmt,
};

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::Serialize;

use crate::{
    data::{SourceType, Value, value_as_datetime},
    error::{ConfigError, PhaseError},
    fields::{
        self, DATE, DAY, DURATION, FieldBindings, HOUR, IS_WEEKEND, MONTH, QUARTER, RENAMES, YEAR,
    },
    frame::{Column, Frame},
};

pub const DEFAULT_START_COLUMN: &str = "Start_Time";
pub const DEFAULT_END_COLUMN: &str = "End_Time";
pub const DEFAULT_DATE_CUTOFF: &str = "2018-01-01";
pub const DEFAULT_STRING_LENGTH_LIMIT: usize = 50;
pub const DEFAULT_DROP_COLUMNS: &[&str] = &[
    "ID",
    "Description",
    "End_Lat",
    "End_Lng",
    "End_Time",
    "Weather_Timestamp",
];

pub const SEVERITY_LEVELS: &[i64] = &[1, 2, 3, 4];
pub const UNKNOWN: &str = "Unknown";
const MISSING_TEXT_TOKENS: &[&str] = &["", "none", "nan", "null", "n/a", "na"];
const COORDINATE_DECIMALS: i32 = 6;
const MEASURE_DECIMALS: i32 = 4;
const DEDUP_COORDINATE_DECIMALS: i32 = 4;

const FACT_COLUMNS: &[&str] = &["SEVERITY", "DISTANCE", DURATION];
const LOCATION_COLUMNS: &[&str] = &[
    "LATITUDE",
    "LONGITUDE",
    "STREET",
    "CITY",
    "COUNTY",
    "STATE",
    "ZIPCODE",
    "COUNTRY",
    "TIMEZONE",
    "AIRPORT_CODE",
];
const WEATHER_COLUMNS: &[&str] = &[
    "WEATHER_CONDITION",
    "TEMPERATURE",
    "WIND_CHILL",
    "HUMIDITY",
    "PRESSURE",
    "VISIBILITY",
    "WIND_DIRECTION",
    "WIND_SPEED",
    "PRECIPITATION",
];
const ENVIRONMENT_COLUMNS: &[&str] = &[
    "AMENITY",
    "BUMP",
    "CROSSING",
    "GIVE_WAY",
    "JUNCTION",
    "NO_EXIT",
    "RAILWAY",
    "ROUNDABOUT",
    "STATION",
    "STOP",
    "TRAFFIC_CALMING",
    "TRAFFIC_SIGNAL",
    "TURNING_LOOP",
    "SUNRISE_SUNSET",
    "CIVIL_TWILIGHT",
    "NAUTICAL_TWILIGHT",
    "ASTRONOMICAL_TWILIGHT",
];

/// Settings shared by every phase for the duration of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub start_column: String,
    pub end_column: String,
    pub drop_columns: Vec<String>,
    pub date_cutoff: NaiveDate,
    /// Drop records holding any text value longer than this many characters.
    pub max_string_length: Option<usize>,
    pub deduplicate: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            start_column: DEFAULT_START_COLUMN.to_string(),
            end_column: DEFAULT_END_COLUMN.to_string(),
            drop_columns: DEFAULT_DROP_COLUMNS.iter().map(|c| c.to_string()).collect(),
            date_cutoff: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or_default(),
            max_string_length: None,
            deduplicate: true,
        }
    }
}

impl PipelineConfig {
    pub fn parse_cutoff(value: &str) -> Result<NaiveDate, ConfigError> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .map_err(|_| ConfigError::InvalidCutoff(value.to_string()))
    }

    pub fn cutoff_timestamp(&self) -> NaiveDateTime {
        NaiveDateTime::new(self.date_cutoff, NaiveTime::MIN)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Phase {
    Prune,
    DateFilter,
    TimeFeatures,
    Normalize,
    StandardizeNames,
    Validate,
    Reorder,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::Prune,
        Phase::DateFilter,
        Phase::TimeFeatures,
        Phase::Normalize,
        Phase::StandardizeNames,
        Phase::Validate,
        Phase::Reorder,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Prune => "prune",
            Phase::DateFilter => "date-filter",
            Phase::TimeFeatures => "time-features",
            Phase::Normalize => "normalize",
            Phase::StandardizeNames => "standardize-names",
            Phase::Validate => "validate",
            Phase::Reorder => "reorder",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Phase::Prune => {
                "Compute DURATION from start/end timestamps (negative values clamp to 0), drop identifier and administrative columns, optionally drop records with over-long text"
            }
            Phase::DateFilter => {
                "Parse the start timestamp and keep records on or after the cutoff date; unparseable timestamps are dropped"
            }
            Phase::TimeFeatures => {
                "Derive DATE, YEAR, QUARTER, MONTH, DAY, HOUR and IS_WEEKEND, then drop the start timestamp"
            }
            Phase::Normalize => {
                "Trim text and fill missing text with 'Unknown', round coordinates to 6 and measures to 4 decimals, narrow integers, force flag columns to booleans"
            }
            Phase::StandardizeNames => {
                "Uppercase column names, strip unit suffixes, use underscores, rename START_LAT/START_LNG to LATITUDE/LONGITUDE"
            }
            Phase::Validate => {
                "Keep severity levels 1-4 and remove duplicate records sharing rounded coordinates and hour"
            }
            Phase::Reorder => {
                "Group columns as facts, time, location, weather, environment, then the rest"
            }
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The phase sequence bound to one run's configuration and field bindings.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    bindings: FieldBindings,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, bindings: FieldBindings) -> Self {
        Self { config, bindings }
    }

    pub fn bindings(&self) -> &FieldBindings {
        &self.bindings
    }

    /// Applies every phase in order.
    pub fn run(&self, mut frame: Frame) -> Result<Frame, PhaseError> {
        for phase in Phase::ALL {
            frame = self.apply(phase, frame)?;
        }
        Ok(frame)
    }

    pub fn apply(&self, phase: Phase, frame: Frame) -> Result<Frame, PhaseError> {
        let frame = match phase {
            Phase::Prune => self.prune(frame),
            Phase::DateFilter => self.filter_dates(frame),
            Phase::TimeFeatures => self.derive_time_features(frame),
            Phase::Normalize => normalize_values(frame),
            Phase::StandardizeNames => standardize_names(frame)?,
            Phase::Validate => self.validate(frame),
            Phase::Reorder => reorder_columns(frame),
        };
        ensure_rectangular(phase, &frame)?;
        Ok(frame)
    }

    fn prune(&self, mut frame: Frame) -> Frame {
        if let (Some(start), Some(end)) = (&self.bindings.start_time, &self.bindings.end_time)
            && let (Some(start_col), Some(end_col)) =
                (frame.column(&start.source), frame.column(&end.source))
        {
            let durations = start_col
                .values
                .iter()
                .zip(&end_col.values)
                .map(|(start, end)| {
                    let start = start.as_ref().and_then(value_as_datetime)?;
                    let end = end.as_ref().and_then(value_as_datetime)?;
                    Some(Value::Integer((end - start).num_seconds().max(0)))
                })
                .collect();
            frame.push_column(Column::new(DURATION, SourceType::Int64, durations));
        }

        frame.drop_columns(&self.config.drop_columns);

        if let Some(limit) = self.config.max_string_length {
            let keep = (0..frame.row_count())
                .map(|row| {
                    frame
                        .columns()
                        .iter()
                        .filter(|column| column.dtype.is_text())
                        .all(|column| match &column.values[row] {
                            Some(Value::String(s)) => s.chars().count() <= limit,
                            _ => true,
                        })
                })
                .collect::<Vec<_>>();
            frame.retain_rows(&keep);
        }
        frame
    }

    fn filter_dates(&self, mut frame: Frame) -> Frame {
        let Some(start) = &self.bindings.start_time else {
            return frame;
        };
        let Some(column) = frame.column_mut(&start.source) else {
            return frame;
        };
        column.values = column
            .values
            .iter()
            .map(|cell| cell.as_ref().and_then(value_as_datetime).map(Value::DateTime))
            .collect();
        column.dtype = SourceType::DateTime;

        let cutoff = self.config.cutoff_timestamp();
        let keep = column
            .values
            .iter()
            .map(|cell| matches!(cell, Some(Value::DateTime(ts)) if *ts >= cutoff))
            .collect::<Vec<_>>();
        frame.retain_rows(&keep);
        frame
    }

    fn derive_time_features(&self, mut frame: Frame) -> Frame {
        let Some(start) = &self.bindings.start_time else {
            return frame;
        };
        let Some(source) = frame.remove_column(&start.source) else {
            return frame;
        };
        let stamps = source
            .values
            .iter()
            .map(|cell| cell.as_ref().and_then(value_as_datetime))
            .collect::<Vec<_>>();
        drop(source);

        frame.push_column(time_feature(&stamps, DATE, SourceType::Date, |ts| Value::Date(ts.date())));
        frame.push_column(time_feature(&stamps, YEAR, SourceType::Int16, |ts| {
            Value::Integer(i64::from(ts.year()))
        }));
        frame.push_column(time_feature(&stamps, QUARTER, SourceType::Int8, |ts| {
            Value::Integer(i64::from(ts.month0() / 3 + 1))
        }));
        frame.push_column(time_feature(&stamps, MONTH, SourceType::Int8, |ts| {
            Value::Integer(i64::from(ts.month()))
        }));
        frame.push_column(time_feature(&stamps, DAY, SourceType::Int8, |ts| {
            Value::Integer(i64::from(ts.day()))
        }));
        frame.push_column(time_feature(&stamps, HOUR, SourceType::Int8, |ts| {
            Value::Integer(i64::from(ts.hour()))
        }));
        frame.push_column(time_feature(&stamps, IS_WEEKEND, SourceType::Boolean, |ts| {
            Value::Boolean(matches!(ts.weekday(), Weekday::Sat | Weekday::Sun))
        }));
        frame
    }

    fn validate(&self, mut frame: Frame) -> Frame {
        if let Some(severity) = &self.bindings.severity
            && let Some(column) = frame.column(&severity.output)
        {
            let keep = column
                .values
                .iter()
                .map(|cell| {
                    cell.as_ref()
                        .and_then(Value::as_f64)
                        .is_some_and(|level| SEVERITY_LEVELS.iter().any(|l| *l as f64 == level))
                })
                .collect::<Vec<_>>();
            frame.retain_rows(&keep);
        }

        if self.config.deduplicate {
            let keep = self.first_occurrences(&frame);
            if let Some(keep) = keep {
                frame.retain_rows(&keep);
            }
        }
        frame
    }

    /// Marks the first record of every (rounded coordinates, hour) group, or
    /// `None` when the window lacks the columns to build the key.
    fn first_occurrences(&self, frame: &Frame) -> Option<Vec<bool>> {
        let latitude = frame.column(&self.bindings.latitude.as_ref()?.output)?;
        let longitude = frame.column(&self.bindings.longitude.as_ref()?.output)?;
        let time_columns = [YEAR, MONTH, DAY, HOUR]
            .iter()
            .map(|name| frame.column(name))
            .collect::<Option<Vec<_>>>()?;

        let mut seen = HashSet::with_capacity(frame.row_count());
        let keep = (0..frame.row_count())
            .map(|row| {
                let key = (
                    rounded_key(latitude.values[row].as_ref()),
                    rounded_key(longitude.values[row].as_ref()),
                    time_columns
                        .iter()
                        .map(|column| match column.values[row] {
                            Some(Value::Integer(v)) => Some(v),
                            _ => None,
                        })
                        .collect::<Vec<_>>(),
                );
                seen.insert(key)
            })
            .collect();
        Some(keep)
    }
}

fn time_feature(
    stamps: &[Option<NaiveDateTime>],
    name: &str,
    dtype: SourceType,
    derive: impl Fn(&NaiveDateTime) -> Value,
) -> Column {
    Column::new(name, dtype, stamps.iter().map(|ts| ts.as_ref().map(&derive)).collect())
}

fn rounded_key(value: Option<&Value>) -> Option<i64> {
    let scale = 10f64.powi(DEDUP_COORDINATE_DECIMALS);
    value
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .map(|v| (v * scale).round() as i64)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

fn is_missing_text(value: &str) -> bool {
    let lowered = value.to_ascii_lowercase();
    MISSING_TEXT_TOKENS.contains(&lowered.as_str())
}

fn normalize_values(mut frame: Frame) -> Frame {
    for column in frame.columns_mut() {
        if fields::is_flag_column(&column.name) {
            force_boolean(column);
        } else if column.dtype.is_text() {
            normalize_text(column);
        } else if column.dtype.is_float() {
            let decimals = if fields::is_coordinate_column(&column.name) {
                COORDINATE_DECIMALS
            } else {
                MEASURE_DECIMALS
            };
            for value in column.values.iter_mut().flatten() {
                if let Value::Float(f) = value {
                    *f = round_to(*f, decimals);
                }
            }
        } else if column.dtype.is_integer() {
            column.dtype = integer_width(column);
        }
    }
    frame
}

fn normalize_text(column: &mut Column) {
    for cell in column.values.iter_mut() {
        let replacement = match cell {
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                if is_missing_text(trimmed) {
                    UNKNOWN.to_string()
                } else if trimmed.len() != s.len() {
                    trimmed.to_string()
                } else {
                    continue;
                }
            }
            Some(other) => other.as_display().trim().to_string(),
            None => UNKNOWN.to_string(),
        };
        *cell = Some(Value::String(replacement));
    }
}

fn force_boolean(column: &mut Column) {
    for cell in column.values.iter_mut() {
        *cell = match cell.take() {
            Some(Value::Boolean(b)) => Some(Value::Boolean(b)),
            Some(Value::Integer(i)) => Some(Value::Boolean(i != 0)),
            Some(Value::Float(f)) if !f.is_nan() => Some(Value::Boolean(f != 0.0)),
            Some(Value::String(s)) => crate::data::parse_boolean_token(&s).map(Value::Boolean),
            _ => None,
        };
    }
    column.dtype = SourceType::Boolean;
}

/// Width the normalize phase always gives a named integer column, if any.
pub fn fixed_integer_width(name: &str) -> Option<SourceType> {
    match fields::standardize_column_name(name).as_str() {
        YEAR => Some(SourceType::Int16),
        QUARTER | MONTH | DAY | HOUR => Some(SourceType::Int8),
        DURATION => Some(SourceType::Int64),
        _ => None,
    }
}

/// Integer width for a column: fixed for time parts and durations, 32-bit
/// otherwise, falling back to 64-bit when values do not fit.
fn integer_width(column: &Column) -> SourceType {
    let wanted = fixed_integer_width(&column.name).unwrap_or(SourceType::Int32);
    let (min, max) = match wanted {
        SourceType::Int8 => (i64::from(i8::MIN), i64::from(i8::MAX)),
        SourceType::Int16 => (i64::from(i16::MIN), i64::from(i16::MAX)),
        SourceType::Int32 => (i64::from(i32::MIN), i64::from(i32::MAX)),
        _ => return SourceType::Int64,
    };
    let fits = column.non_null().all(|value| match value {
        Value::Integer(i) => (min..=max).contains(i),
        _ => false,
    });
    if fits { wanted } else { SourceType::Int64 }
}

fn standardize_names(mut frame: Frame) -> Result<Frame, PhaseError> {
    let mut names = frame
        .columns()
        .iter()
        .map(|column| fields::standardize_column_name(&column.name))
        .collect::<Vec<_>>();
    for &(from, to) in RENAMES {
        if names.iter().any(|name| name.as_str() == to) {
            continue;
        }
        if let Some(name) = names.iter_mut().find(|name| name.as_str() == from) {
            *name = to.to_string();
        }
    }

    let mut seen = HashSet::with_capacity(names.len());
    for (column, name) in frame.columns().iter().zip(&names) {
        if name.is_empty() {
            return Err(PhaseError::new(
                Phase::StandardizeNames,
                format!("column '{}' has no name after standardization", column.name),
            ));
        }
        if !seen.insert(name.as_str()) {
            return Err(PhaseError::new(
                Phase::StandardizeNames,
                format!("column '{}' collides with another column as '{name}'", column.name),
            ));
        }
    }

    for (column, name) in frame.columns_mut().iter_mut().zip(names) {
        column.name = name;
    }
    Ok(frame)
}

fn reorder_columns(mut frame: Frame) -> Frame {
    let groups = [
        FACT_COLUMNS,
        fields::TIME_FEATURES,
        LOCATION_COLUMNS,
        WEATHER_COLUMNS,
        ENVIRONMENT_COLUMNS,
    ];
    let mut order = Vec::with_capacity(frame.width());
    for group in groups {
        order.extend(group.iter().filter_map(|name| frame.column_index(name)));
    }
    let placed = order.iter().copied().collect::<HashSet<_>>();
    order.extend((0..frame.width()).filter(|idx| !placed.contains(idx)));
    frame.reorder(&order);
    frame
}

fn ensure_rectangular(phase: Phase, frame: &Frame) -> Result<(), PhaseError> {
    let rows = frame.row_count();
    match frame.columns().iter().find(|column| column.len() != rows) {
        Some(column) => Err(PhaseError::new(
            phase,
            format!(
                "column '{}' has {} values but the window has {rows} rows",
                column.name,
                column.len()
            ),
        )),
        None => Ok(()),
    }
}
