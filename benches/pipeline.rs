use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use accident_etl::driver::{self, DriverConfig};
use accident_etl::fields::FieldBindings;
use accident_etl::frame::Frame;
use accident_etl::pipeline::{Pipeline, PipelineConfig};
use accident_etl::profile;
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use tempfile::TempDir;

const HEADER: &[&str] = &[
    "ID",
    "Severity",
    "Start_Time",
    "End_Time",
    "Start_Lat",
    "Start_Lng",
    "Distance(mi)",
    "Street",
    "City",
    "Weather_Condition",
    "Crossing",
];

fn record(i: usize) -> Vec<String> {
    let year = 2016 + i % 6;
    let month = i % 12 + 1;
    let day = i % 28 + 1;
    let hour = i % 24;
    vec![
        format!("A-{i}"),
        (i % 5).to_string(),
        format!("{year}-{month:02}-{day:02} {hour:02}:10:00"),
        format!("{year}-{month:02}-{day:02} {hour:02}:55:00"),
        format!("{:.6}", 30.0 + (i % 997) as f64 * 0.001),
        format!("{:.6}", -97.0 - (i % 991) as f64 * 0.001),
        format!("{:.2}", (i % 40) as f64 * 0.05),
        format!(" Street {} ", i % 300),
        ["Dallas", "Austin", "Houston", ""][i % 4].to_string(),
        ["Clear", "Rain", "None", "Fog"][i % 4].to_string(),
        (i % 2).to_string(),
    ]
}

fn synthetic_frame(rows: usize) -> Frame {
    let headers = HEADER.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    Frame::from_records(&headers, (0..rows).map(record).collect())
}

fn generate_accidents(rows: usize) -> (TempDir, PathBuf) {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let csv_path = temp_dir.path().join("accidents.csv");
    let mut file = File::create(&csv_path).expect("create csv");
    writeln!(file, "{}", HEADER.join(",")).expect("header");
    for i in 0..rows {
        writeln!(file, "{}", record(i).join(",")).expect("row");
    }
    (temp_dir, csv_path)
}

fn bench_phases(c: &mut Criterion) {
    let frame = synthetic_frame(20_000);
    let config = PipelineConfig::default();
    let bindings = FieldBindings::resolve(&frame.column_names(), &config);
    let pipeline = Pipeline::new(config, bindings);

    c.bench_function("pipeline_all_phases_20k", |b| {
        b.iter_batched(
            || frame.clone(),
            |frame| pipeline.run(frame).expect("pipeline run"),
            BatchSize::LargeInput,
        )
    });

    c.bench_function("characterize_20k", |b| {
        b.iter(|| profile::characterize_frame(&frame))
    });
}

fn bench_driver(c: &mut Criterion) {
    let (temp_dir, input) = generate_accidents(50_000);
    let output = temp_dir.path().join("accidents-final.csv");
    let mut group = c.benchmark_group("driver_50k");
    group.sample_size(10);

    for window_size in [5_000usize, 50_000] {
        let mut config = DriverConfig::new(&input, &output);
        config.window_size = window_size;
        group.bench_function(format!("window_{window_size}"), |b| {
            b.iter(|| driver::run(&config).expect("driver run"))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_phases, bench_driver);
criterion_main!(benches);
