//! Column vocabulary and logical field bindings.
//!
//! The accident dataset has a handful of columns the pipeline treats
//! specially (timestamps, severity, coordinates, flag dimensions). Their
//! physical names are resolved once per run by [`FieldBindings::resolve`]
//! rather than searched for again inside every phase.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::pipeline::PipelineConfig;

pub const DATE_DIMENSION_NAMES: &[&str] = &["DATE", "FULL_DATE"];
pub const COORDINATE_KEYWORDS: &[&str] = &["LATITUDE", "LONGITUDE", "LAT", "LNG"];
pub const STREET: &str = "STREET";
pub const DURATION: &str = "DURATION";

pub const FLAG_COLUMNS: &[&str] = &[
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
    "IS_WEEKEND",
];

pub const DATE: &str = "DATE";
pub const YEAR: &str = "YEAR";
pub const QUARTER: &str = "QUARTER";
pub const MONTH: &str = "MONTH";
pub const DAY: &str = "DAY";
pub const HOUR: &str = "HOUR";
pub const IS_WEEKEND: &str = "IS_WEEKEND";

/// Columns added by time-feature derivation, in output order.
pub const TIME_FEATURES: &[&str] = &[DATE, YEAR, QUARTER, MONTH, DAY, HOUR, IS_WEEKEND];

/// Aliases applied after name standardization.
pub const RENAMES: &[(&str, &str)] = &[("START_LAT", "LATITUDE"), ("START_LNG", "LONGITUDE")];

static PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)").expect("valid parenthesized regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_+").expect("valid underscore regex"));

/// Uppercases a column name and strips unit suffixes and stray separators.
///
/// `"Distance(mi)"` becomes `"DISTANCE"`, `"Wind Speed (mph)"` becomes
/// `"WIND_SPEED"`.
pub fn standardize_column_name(name: &str) -> String {
    let upper = name.to_uppercase();
    let stripped = PARENTHESIZED.replace_all(&upper, "");
    let joined = WHITESPACE.replace_all(stripped.trim(), "_");
    let collapsed = UNDERSCORES.replace_all(&joined, "_");
    collapsed.trim_matches('_').to_string()
}

/// Standardized name with the alias map applied.
pub fn output_column_name(name: &str) -> String {
    let standardized = standardize_column_name(name);
    RENAMES
        .iter()
        .find(|(from, _)| *from == standardized)
        .map(|(_, to)| to.to_string())
        .unwrap_or(standardized)
}

pub fn is_coordinate_column(name: &str) -> bool {
    let standardized = standardize_column_name(name);
    COORDINATE_KEYWORDS
        .iter()
        .any(|keyword| standardized.contains(keyword))
}

pub fn is_flag_column(name: &str) -> bool {
    FLAG_COLUMNS.contains(&standardize_column_name(name).as_str())
}

pub fn is_date_dimension(name: &str) -> bool {
    DATE_DIMENSION_NAMES.contains(&standardize_column_name(name).as_str())
}

/// A logical field resolved to its physical column name before and after
/// name standardization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub source: String,
    pub output: String,
}

impl Binding {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            output: output_column_name(source),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldBindings {
    pub start_time: Option<Binding>,
    pub end_time: Option<Binding>,
    pub severity: Option<Binding>,
    pub latitude: Option<Binding>,
    pub longitude: Option<Binding>,
}

impl FieldBindings {
    pub fn resolve(headers: &[String], config: &PipelineConfig) -> Self {
        let exact = |wanted: &str| {
            headers
                .iter()
                .find(|h| h.eq_ignore_ascii_case(wanted))
                .map(|h| Binding::new(h))
        };
        let by_standard_name = |candidates: &[&str]| {
            candidates.iter().find_map(|candidate| {
                headers
                    .iter()
                    .find(|h| standardize_column_name(h) == *candidate)
                    .map(|h| Binding::new(h))
            })
        };
        let bindings = Self {
            start_time: exact(&config.start_column),
            end_time: exact(&config.end_column),
            severity: headers
                .iter()
                .find(|h| h.to_uppercase().contains("SEVERITY"))
                .map(|h| Binding::new(h)),
            latitude: by_standard_name(&["LATITUDE", "START_LAT"]),
            longitude: by_standard_name(&["LONGITUDE", "START_LNG"]),
        };
        debug!("Resolved field bindings: {bindings:?}");
        bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn standardize_strips_units_and_separators() {
        assert_eq!(standardize_column_name("Distance(mi)"), "DISTANCE");
        assert_eq!(standardize_column_name("Wind Speed (mph)"), "WIND_SPEED");
        assert_eq!(standardize_column_name("  __odd   name__ "), "ODD_NAME");
        assert_eq!(standardize_column_name("Temperature(F)"), "TEMPERATURE");
    }

    #[test]
    fn output_name_applies_aliases() {
        assert_eq!(output_column_name("Start_Lat"), "LATITUDE");
        assert_eq!(output_column_name("Start_Lng"), "LONGITUDE");
        assert_eq!(output_column_name("City"), "CITY");
    }

    #[test]
    fn vocabulary_predicates_ignore_case() {
        assert!(is_flag_column("Crossing"));
        assert!(is_flag_column("Traffic_Signal"));
        assert!(!is_flag_column("Severity"));
        assert!(is_coordinate_column("Start_Lat"));
        assert!(is_date_dimension("date"));
    }

    #[test]
    fn resolve_binds_logical_fields_once() {
        let config = PipelineConfig::default();
        let bindings = FieldBindings::resolve(
            &headers(&["ID", "Severity", "start_time", "End_Time", "Start_Lat", "Start_Lng"]),
            &config,
        );
        assert_eq!(bindings.start_time.unwrap().source, "start_time");
        assert_eq!(bindings.end_time.unwrap().output, "END_TIME");
        assert_eq!(bindings.severity.unwrap().output, "SEVERITY");
        assert_eq!(bindings.latitude.unwrap().output, "LATITUDE");
        assert_eq!(bindings.longitude.unwrap().source, "Start_Lng");
    }

    #[test]
    fn resolve_leaves_missing_fields_unbound() {
        let bindings = FieldBindings::resolve(&headers(&["City"]), &PipelineConfig::default());
        assert_eq!(bindings, FieldBindings::default());
    }
}
