use std::{fmt, fmt::Write as _, path::Path};

use chrono::NaiveDateTime;
use serde::Serialize;

use super::{
    DatasetSample, TIMESTAMP_FORMAT, conversion, format_count, format_file_size, format_metric,
    now, percentage, strings, truncate, write_report,
};
use crate::{
    error::ReportError,
    profile::{self, ColumnProfile},
    table,
};

const MISSING_PENALTY_CAP: f64 = 30.0;
const HIGH_CARDINALITY_RATIO: f64 = 0.8;
const HIGH_CARDINALITY_PENALTY: f64 = 5.0;
const MOST_FREQUENT_WIDTH: usize = 15;
const MISSING_TABLE_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QualityLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            QualityLevel::Excellent
        } else if score >= 75.0 {
            QualityLevel::Good
        } else if score >= 60.0 {
            QualityLevel::Fair
        } else {
            QualityLevel::Poor
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QualityLevel::Excellent => "Excellent",
            QualityLevel::Good => "Good",
            QualityLevel::Fair => "Fair",
            QualityLevel::Poor => "Poor",
        };
        f.write_str(label)
    }
}

/// `100 - min(missing %, 30) - 5 per high-cardinality text column`, floored at 0.
pub fn quality_score(overall_missing_pct: f64, high_cardinality_columns: usize) -> f64 {
    let score = 100.0
        - overall_missing_pct.min(MISSING_PENALTY_CAP)
        - HIGH_CARDINALITY_PENALTY * high_cardinality_columns as f64;
    score.max(0.0)
}

/// Counts of columns per missing-value band.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MissingBands {
    pub none: usize,
    pub up_to_5: usize,
    pub up_to_25: usize,
    pub up_to_75: usize,
    pub over_75: usize,
}

impl MissingBands {
    fn from_profiles(profiles: &[ColumnProfile]) -> Self {
        let mut bands = Self::default();
        for p in profiles {
            match p.null_percentage {
                pct if pct == 0.0 => bands.none += 1,
                pct if pct <= 5.0 => bands.up_to_5 += 1,
                pct if pct <= 25.0 => bands.up_to_25 += 1,
                pct if pct <= 75.0 => bands.up_to_75 += 1,
                _ => bands.over_75 += 1,
            }
        }
        bands
    }
}

/// Profile-driven description of one dataset sample.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub generated_at: NaiveDateTime,
    pub source: String,
    pub total_rows: usize,
    pub sample_rows: usize,
    pub file_size: u64,
    pub memory_mb: f64,
    pub profiles: Vec<ColumnProfile>,
}

impl AnalysisReport {
    pub fn assemble(sample: &DatasetSample) -> Result<Self, ReportError> {
        if sample.frame.is_empty() {
            return Err(ReportError::NoData {
                path: sample.path.clone(),
            });
        }
        Ok(Self {
            generated_at: now(),
            source: sample.path.display().to_string(),
            total_rows: sample.total_rows,
            sample_rows: sample.sample_rows(),
            file_size: sample.file_size,
            memory_mb: sample.memory_mb(),
            profiles: profile::characterize_frame(&sample.frame),
        })
    }

    /// Nulls over all sampled cells.
    pub fn overall_missing_pct(&self) -> f64 {
        let nulls: usize = self.profiles.iter().map(|p| p.null_count).sum();
        let cells = self.sample_rows * self.profiles.len();
        percentage(nulls as f64, cells as f64)
    }

    pub fn missing_bands(&self) -> MissingBands {
        MissingBands::from_profiles(&self.profiles)
    }

    pub fn high_cardinality_columns(&self) -> Vec<&ColumnProfile> {
        self.profiles
            .iter()
            .filter(|p| p.source_type.is_text() && p.cardinality_ratio() > HIGH_CARDINALITY_RATIO)
            .collect()
    }

    pub fn quality_score(&self) -> f64 {
        quality_score(
            self.overall_missing_pct(),
            self.high_cardinality_columns().len(),
        )
    }

    pub fn quality_level(&self) -> QualityLevel {
        QualityLevel::from_score(self.quality_score())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "DATASET ANALYSIS REPORT");
        let _ = writeln!(out, "{}", table::render_rule());
        out.push_str(&table::render_key_values(&[
            ("File", self.source.clone()),
            ("Generated", self.generated_at.format(TIMESTAMP_FORMAT).to_string()),
        ]));

        out.push_str(&table::render_heading("BASIC INFORMATION"));
        out.push_str(&table::render_key_values(&[
            ("Total rows", format_count(self.total_rows)),
            ("Columns", self.profiles.len().to_string()),
            ("Sampled rows", format_count(self.sample_rows)),
            ("File size", format_file_size(self.file_size)),
            ("Sample memory", format!("{:.2} MB", self.memory_mb)),
        ]));
        self.render_missing(&mut out);
        self.render_numeric(&mut out);
        self.render_categorical(&mut out);

        out.push_str(&table::render_heading("SQL SERVER TYPE CONVERSION"));
        out.push_str(&conversion::conversion_table(&self.profiles));
        out.push('\n');
        out.push_str(&conversion::distribution_table(&self.profiles));

        out.push_str(&table::render_heading("DATA QUALITY"));
        out.push_str(&table::render_key_values(&[
            ("Missing cells", format!("{:.2}%", self.overall_missing_pct())),
            (
                "High-cardinality text columns",
                self.high_cardinality_columns().len().to_string(),
            ),
            ("Quality score", format!("{:.1}/100", self.quality_score())),
            ("Quality level", self.quality_level().to_string()),
        ]));
        out
    }

    fn render_missing(&self, out: &mut String) {
        out.push_str(&table::render_heading("MISSING VALUES"));
        let mut missing = self
            .profiles
            .iter()
            .filter(|p| p.null_count > 0)
            .collect::<Vec<_>>();
        if missing.is_empty() {
            let _ = writeln!(out, "  No missing values in the sample.");
        } else {
            missing.sort_by(|a, b| b.null_percentage.total_cmp(&a.null_percentage));
            let rows = missing
                .iter()
                .take(MISSING_TABLE_LIMIT)
                .map(|p| {
                    vec![
                        p.name.clone(),
                        format_count(p.null_count),
                        format!("{:.2}%", p.null_percentage),
                    ]
                })
                .collect::<Vec<_>>();
            out.push_str(&table::render_table(
                &strings(["column", "missing", "percent"]),
                &rows,
            ));
        }
        let bands = self.missing_bands();
        out.push('\n');
        out.push_str(&table::render_key_values(&[
            ("No missing", bands.none.to_string()),
            ("Up to 5%", bands.up_to_5.to_string()),
            ("5-25%", bands.up_to_25.to_string()),
            ("25-75%", bands.up_to_75.to_string()),
            ("Over 75%", bands.over_75.to_string()),
        ]));
    }

    fn render_numeric(&self, out: &mut String) {
        out.push_str(&table::render_heading("NUMERIC COLUMNS"));
        let rows = self
            .profiles
            .iter()
            .filter_map(|p| p.numbers.as_ref().map(|n| (p, n)))
            .map(|(p, n)| {
                vec![
                    p.name.clone(),
                    format_metric(Some(n.mean)),
                    format_metric(n.std_dev),
                    format_metric(Some(n.min)),
                    format_metric(Some(n.max)),
                ]
            })
            .collect::<Vec<_>>();
        if rows.is_empty() {
            let _ = writeln!(out, "  No numeric columns.");
        } else {
            out.push_str(&table::render_table(
                &strings(["column", "mean", "std", "min", "max"]),
                &rows,
            ));
        }
    }

    fn render_categorical(&self, out: &mut String) {
        out.push_str(&table::render_heading("CATEGORICAL COLUMNS"));
        let rows = self
            .profiles
            .iter()
            .filter(|p| p.source_type.is_text())
            .map(|p| {
                vec![
                    p.name.clone(),
                    format_count(p.unique_count),
                    format!("{:.3}", p.cardinality_ratio()),
                    p.most_frequent
                        .as_deref()
                        .map(|v| truncate(v, MOST_FREQUENT_WIDTH))
                        .unwrap_or_else(|| "N/A".to_string()),
                ]
            })
            .collect::<Vec<_>>();
        if rows.is_empty() {
            let _ = writeln!(out, "  No categorical columns.");
        } else {
            out.push_str(&table::render_table(
                &strings(["column", "unique", "cardinality", "most frequent"]),
                &rows,
            ));
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ReportError> {
        write_report(path, &self.render())
    }
}
