#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, TimeDelta};
use tempfile::{TempDir, tempdir};

/// Header of the accident extracts used across the integration tests.
pub const ACCIDENT_HEADER: &str = "ID,Source,Severity,Start_Time,End_Time,Start_Lat,Start_Lng,End_Lat,End_Lng,Distance(mi),Description,Street,City,State,Temperature(F),Weather_Timestamp,Weather_Condition,Crossing,Traffic_Signal";

/// Output header produced by the pipeline for [`ACCIDENT_HEADER`] input.
pub const PROCESSED_HEADER: &str = "SEVERITY,DISTANCE,DURATION,DATE,YEAR,QUARTER,MONTH,DAY,HOUR,IS_WEEKEND,LATITUDE,LONGITUDE,STREET,CITY,STATE,WEATHER_CONDITION,TEMPERATURE,CROSSING,TRAFFIC_SIGNAL,SOURCE";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes an accident extract built from `records` under the standard header.
    pub fn write_accidents(&self, name: &str, records: &[String]) -> PathBuf {
        self.write(name, &accident_csv(records))
    }
}

/// One accident record. The end time is thirty minutes after `start` when
/// `start` parses, otherwise it repeats `start` verbatim.
pub fn accident_record(id: usize, severity: &str, start: &str, lat: f64, city: &str) -> String {
    let end = NaiveDateTime::parse_from_str(start, "%Y-%m-%d %H:%M:%S")
        .map(|ts| (ts + TimeDelta::minutes(30)).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| start.to_string());
    format!(
        "A-{id},Source2,{severity},{start},{end},{lat},-96.8,{lat},-96.8,0.5,Accident on I-35,  Main St ,{city},TX,55.0,{start},Clear,False,True"
    )
}

/// `count` records that all survive the pipeline: valid severities, dates
/// after 2018, and distinct coordinates.
pub fn distinct_records(count: usize) -> Vec<String> {
    (0..count)
        .map(|idx| {
            let severity = (idx % 4 + 1).to_string();
            let start = format!("2019-03-{:02} {:02}:15:00", idx % 28 + 1, idx % 24);
            accident_record(idx + 1, &severity, &start, 32.0 + idx as f64 * 0.01, "Dallas")
        })
        .collect()
}

pub fn accident_csv(records: &[String]) -> String {
    let mut csv = String::from(ACCIDENT_HEADER);
    csv.push('\n');
    for record in records {
        csv.push_str(record);
        csv.push('\n');
    }
    csv
}

/// Reads a CSV file into its header and data rows.
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).expect("open csv");
    let headers = reader
        .headers()
        .expect("headers")
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|record| record.expect("record").iter().map(str::to_string).collect())
        .collect();
    (headers, rows)
}

/// Value of `column` in `row`, looked up through `headers`.
pub fn cell<'a>(headers: &[String], row: &'a [String], column: &str) -> &'a str {
    let idx = headers
        .iter()
        .position(|h| h == column)
        .unwrap_or_else(|| panic!("missing column {column}"));
    &row[idx]
}
