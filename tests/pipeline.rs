mod common;

use accident_etl::{
    data::{SourceType, Value},
    driver::{self, DriverConfig},
    fields::{self, FieldBindings},
    frame::{Column, Frame},
    io_utils,
    pipeline::{DEFAULT_STRING_LENGTH_LIMIT, Phase, Pipeline, PipelineConfig, UNKNOWN},
    profile,
    report::DatasetSample,
    types::{self, SqlType},
};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use common::{TestWorkspace, accident_record, cell, read_csv};
use proptest::prelude::*;

fn pipeline_for(frame: &Frame, config: PipelineConfig) -> Pipeline {
    let bindings = FieldBindings::resolve(&frame.column_names(), &config);
    Pipeline::new(config, bindings)
}

fn text_frame(headers: &[&str], rows: Vec<Vec<String>>) -> Frame {
    let headers = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    Frame::from_records(&headers, rows)
}

fn profile_of(path: &std::path::Path, column: &str) -> profile::ColumnProfile {
    let sample = DatasetSample::load(path, 1_000, b',', encoding_rs::UTF_8).expect("sample");
    profile::characterize_frame(&sample.frame)
        .into_iter()
        .find(|p| p.name == column)
        .unwrap_or_else(|| panic!("no profile for {column}"))
}

#[test]
fn records_before_the_cutoff_are_filtered_out() {
    let workspace = TestWorkspace::new();
    let mut records = vec![
        accident_record(1, "2", "2016-02-08 05:46:00", 39.86, "Dayton"),
        accident_record(2, "3", "2017-12-31 23:59:59", 39.87, "Dayton"),
    ];
    records.extend((0..8).map(|idx| {
        let start = format!("2018-0{}-15 10:00:00", idx + 1);
        accident_record(idx + 3, "2", &start, 40.0 + idx as f64, "Columbus")
    }));
    let input = workspace.write_accidents("accidents.csv", &records);
    let output = workspace.path().join("out.csv");

    let stats = driver::run(&DriverConfig::new(&input, &output)).expect("run succeeds");
    assert_eq!(stats.total_rows_input, 10);
    assert_eq!(stats.total_rows_output, 8);
    let (headers, rows) = read_csv(&output);
    assert_eq!(rows.len(), 8);
    assert!(!headers.iter().any(|h| h.eq_ignore_ascii_case("Start_Time")));
    assert!(rows.iter().all(|row| cell(&headers, row, "YEAR") == "2018"));
}

#[test]
fn duration_is_measured_in_seconds() {
    let workspace = TestWorkspace::new();
    let input = workspace.write(
        "accidents.csv",
        "Severity,Start_Time,End_Time\n2,2020-01-01 10:00:00,2020-01-01 10:05:30\n",
    );
    let output = workspace.path().join("out.csv");
    driver::run(&DriverConfig::new(&input, &output)).expect("run succeeds");

    let (headers, rows) = read_csv(&output);
    assert_eq!(cell(&headers, &rows[0], "DURATION"), "330");
    assert_eq!(profile_of(&output, "DURATION").target_type(), SqlType::BigInt);
}

#[test]
fn start_latitude_becomes_a_rounded_decimal_latitude() {
    let workspace = TestWorkspace::new();
    let input = workspace.write(
        "accidents.csv",
        "Severity,Start_Time,Start_Lat\n2,2020-01-01 10:00:00,34.123456789\n",
    );
    let output = workspace.path().join("out.csv");
    driver::run(&DriverConfig::new(&input, &output)).expect("run succeeds");

    let (headers, rows) = read_csv(&output);
    assert_eq!(cell(&headers, &rows[0], "LATITUDE"), "34.123457");
    let latitude = profile_of(&output, "LATITUDE");
    assert_eq!(latitude.target_type(), SqlType::COORDINATE);
    assert_eq!(latitude.target_type().to_string(), "DECIMAL(9,6)");
}

#[test]
fn numeric_flags_become_booleans() {
    let workspace = TestWorkspace::new();
    let input = workspace.write(
        "accidents.csv",
        "Severity,Start_Time,Crossing\n\
         2,2020-01-01 10:00:00,0\n\
         2,2020-01-02 10:00:00,1\n\
         2,2020-01-03 10:00:00,1\n\
         2,2020-01-04 10:00:00,0\n",
    );
    let output = workspace.path().join("out.csv");
    driver::run(&DriverConfig::new(&input, &output)).expect("run succeeds");

    let (headers, rows) = read_csv(&output);
    let flags = rows
        .iter()
        .map(|row| cell(&headers, row, "CROSSING"))
        .collect::<Vec<_>>();
    assert_eq!(flags, vec!["False", "True", "True", "False"]);
    let crossing = profile_of(&output, "CROSSING");
    assert_eq!(crossing.source_type, SourceType::Boolean);
    assert_eq!(crossing.target_type(), SqlType::Bit);
}

#[test]
fn long_text_records_are_dropped_before_sizing() {
    let workspace = TestWorkspace::new();
    let contents = format!(
        "Severity,Start_Time,Weather_Condition\n\
         2,2020-01-01 10:00:00,{}\n\
         2,2020-01-02 10:00:00,{}\n\
         2,2020-01-03 10:00:00,{}\n",
        "a".repeat(10),
        "b".repeat(30),
        "c".repeat(52)
    );
    let input = workspace.write("accidents.csv", &contents);
    let output = workspace.path().join("out.csv");
    let mut config = DriverConfig::new(&input, &output);
    config.pipeline.max_string_length = Some(DEFAULT_STRING_LENGTH_LIMIT);

    let stats = driver::run(&config).expect("run succeeds");
    assert_eq!(stats.total_rows_output, 2);
    assert_eq!(stats.removed_by(Phase::Prune), 1);
    let weather = profile_of(&output, "WEATHER_CONDITION");
    assert_eq!(weather.observed_max_length, 30);
    assert_eq!(weather.target_type(), SqlType::NVarChar(Some(50)));
}

#[test]
fn missing_text_is_filled_with_unknown() {
    let workspace = TestWorkspace::new();
    let input = workspace.write(
        "accidents.csv",
        "Severity,Start_Time,City,Wind_Direction\n\
         2,2020-01-01 10:00:00,  Reno ,None\n\
         2,2020-01-02 10:00:00,,SW\n",
    );
    let output = workspace.path().join("out.csv");
    driver::run(&DriverConfig::new(&input, &output)).expect("run succeeds");

    let (headers, rows) = read_csv(&output);
    assert_eq!(cell(&headers, &rows[0], "CITY"), "Reno");
    assert_eq!(cell(&headers, &rows[1], "CITY"), UNKNOWN);
    assert_eq!(cell(&headers, &rows[0], "WIND_DIRECTION"), UNKNOWN);
}

#[test]
fn phases_compose_in_order() {
    let frame = text_frame(
        &["ID", "Severity", "Start_Time", "End_Time", "Start_Lng", "Visibility(mi)"],
        vec![vec![
            "A-9".to_string(),
            "4".to_string(),
            "2022-07-09 18:30:00".to_string(),
            "2022-07-09 19:00:00".to_string(),
            "-118.2436849".to_string(),
            "10.12346".to_string(),
        ]],
    );
    let pipeline = pipeline_for(&frame, PipelineConfig::default());
    let out = pipeline.run(frame).expect("pipeline succeeds");

    assert_eq!(
        out.column_names(),
        vec![
            "SEVERITY", "DURATION", "DATE", "YEAR", "QUARTER", "MONTH", "DAY", "HOUR",
            "IS_WEEKEND", "LONGITUDE", "VISIBILITY",
        ]
    );
    assert_eq!(
        out.row_cells(0),
        vec![
            "4", "1800", "2022-07-09", "2022", "3", "7", "9", "18", "True", "-118.243685",
            "10.1235",
        ]
    );
}

fn timestamp() -> impl Strategy<Value = NaiveDateTime> {
    (2010i32..2030, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60, 0u32..60).prop_map(
        |(year, month, day, hour, minute, second)| {
            NaiveDate::from_ymd_opt(year, month, day)
                .and_then(|date| date.and_hms_opt(hour, minute, second))
                .expect("valid generated timestamp")
        },
    )
}

fn stamp_text(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn integer(column: &Column, row: usize) -> i64 {
    match column.values[row] {
        Some(Value::Integer(v)) => v,
        ref other => panic!("expected integer in {}, found {other:?}", column.name),
    }
}

proptest! {
    #[test]
    fn duration_is_never_negative(
        pairs in prop::collection::vec((timestamp(), -86_400i64..86_400), 1..20)
    ) {
        let rows = pairs
            .iter()
            .map(|(start, offset)| {
                let end = *start + chrono::TimeDelta::seconds(*offset);
                vec![stamp_text(start), stamp_text(&end)]
            })
            .collect();
        let frame = text_frame(&["Start_Time", "End_Time"], rows);
        let pipeline = pipeline_for(&frame, PipelineConfig::default());
        let pruned = pipeline.apply(Phase::Prune, frame).expect("prune succeeds");
        let duration = pruned.column(fields::DURATION).expect("duration column");
        for (row, (_, offset)) in pairs.iter().enumerate() {
            prop_assert_eq!(integer(duration, row), (*offset).max(0));
        }
    }

    #[test]
    fn date_filter_keeps_exactly_the_records_on_or_after_cutoff(
        stamps in prop::collection::vec(timestamp(), 1..30)
    ) {
        let config = PipelineConfig::default();
        let cutoff = config.cutoff_timestamp();
        let rows = stamps.iter().map(|ts| vec![stamp_text(ts)]).collect();
        let frame = text_frame(&["Start_Time"], rows);
        let pipeline = pipeline_for(&frame, config);
        let filtered = pipeline.apply(Phase::DateFilter, frame).expect("filter succeeds");

        let expected = stamps.iter().filter(|ts| **ts >= cutoff).count();
        prop_assert_eq!(filtered.row_count(), expected);
        let column = filtered.column("Start_Time").expect("timestamp kept");
        for value in column.values.iter().flatten() {
            prop_assert!(matches!(value, Value::DateTime(ts) if *ts >= cutoff));
        }
    }

    #[test]
    fn time_features_round_trip_to_the_hour(stamps in prop::collection::vec(timestamp(), 1..20)) {
        let rows = stamps.iter().map(|ts| vec![stamp_text(ts)]).collect();
        let frame = text_frame(&["Start_Time"], rows);
        let pipeline = pipeline_for(&frame, PipelineConfig::default());
        let derived = pipeline
            .apply(Phase::TimeFeatures, frame)
            .expect("derivation succeeds");
        prop_assert!(!derived.contains("Start_Time"));

        let column = |name: &str| derived.column(name).expect("time feature present");
        for (row, ts) in stamps.iter().enumerate() {
            let year = integer(column(fields::YEAR), row);
            let month = integer(column(fields::MONTH), row);
            let day = integer(column(fields::DAY), row);
            let hour = integer(column(fields::HOUR), row);
            let rebuilt = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                .and_then(|date| date.and_hms_opt(hour as u32, 0, 0));
            let truncated = ts.date().and_hms_opt(ts.hour(), 0, 0);
            prop_assert_eq!(rebuilt, truncated);
            prop_assert_eq!(integer(column(fields::QUARTER), row), (month - 1) / 3 + 1);
            prop_assert_eq!(
                column(fields::DATE).values[row].clone(),
                Some(Value::Date(ts.date()))
            );
            let weekend = matches!(ts.weekday(), Weekday::Sat | Weekday::Sun);
            prop_assert_eq!(
                column(fields::IS_WEEKEND).values[row].clone(),
                Some(Value::Boolean(weekend))
            );
        }
    }

    #[test]
    fn normalized_text_is_trimmed_or_unknown(
        cells in prop::collection::vec(prop::option::of("[ a-zA-Z/]{0,12}"), 1..20)
    ) {
        let values = cells.iter().cloned().map(|cell| cell.map(Value::String)).collect();
        let frame = Frame::new(vec![Column::new("City", SourceType::String, values)]);
        let pipeline = pipeline_for(&frame, PipelineConfig::default());
        let normalized = pipeline.apply(Phase::Normalize, frame).expect("normalize succeeds");

        for value in &normalized.column("City").expect("city").values {
            let Some(Value::String(text)) = value else {
                return Err(TestCaseError::fail(format!("expected text, found {value:?}")));
            };
            prop_assert!(text == UNKNOWN || (text.trim() == text && !text.is_empty()));
        }
    }

    #[test]
    fn type_mapping_is_pure(
        type_idx in 0usize..12,
        name in prop::sample::select(vec![
            "Start_Lat", "Street", "Crossing", "DURATION", "Date", "Severity", "City", "Temperature(F)",
        ]),
        length in 0usize..10_000,
    ) {
        let source_types = [
            SourceType::Int8, SourceType::Int16, SourceType::Int32, SourceType::Int64,
            SourceType::Float32, SourceType::Float64, SourceType::Boolean, SourceType::String,
            SourceType::Category, SourceType::DateTime, SourceType::Date, SourceType::Duration,
        ];
        let source = source_types[type_idx];
        let first = types::map_to_target_type(source, name, length);
        let second = types::map_to_target_type(source, name, length);
        prop_assert_eq!(first, second);
        prop_assert_eq!(first.interchange(), second.interchange());
    }

    #[test]
    fn pipeline_never_adds_rows(
        stamps in prop::collection::vec(timestamp(), 0..25),
        severities in prop::collection::vec(0i64..6, 25),
    ) {
        let rows = stamps
            .iter()
            .zip(&severities)
            .map(|(ts, severity)| vec![stamp_text(ts), severity.to_string(), "36.1".to_string(), "-115.1".to_string()])
            .collect::<Vec<_>>();
        let count = rows.len();
        let frame = text_frame(&["Start_Time", "Severity", "Start_Lat", "Start_Lng"], rows);
        let pipeline = pipeline_for(&frame, PipelineConfig::default());
        let out = pipeline.run(frame).expect("pipeline succeeds");
        prop_assert!(out.row_count() <= count);
    }
}

#[test]
fn sampled_output_matches_the_written_file() {
    let workspace = TestWorkspace::new();
    let input = workspace.write_accidents("accidents.csv", &common::distinct_records(4));
    let output = workspace.path().join("out.csv");
    driver::run(&DriverConfig::new(&input, &output)).expect("run succeeds");

    let sample = DatasetSample::load(&output, 2, io_utils::DEFAULT_CSV_DELIMITER, encoding_rs::UTF_8)
        .expect("sample");
    assert_eq!(sample.total_rows, 4);
    assert_eq!(sample.sample_rows(), 2);
    assert_eq!(
        sample.frame.column("YEAR").map(|c| c.dtype),
        Some(SourceType::Int64)
    );
}
