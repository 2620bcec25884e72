use std::{collections::BTreeSet, fmt::Write as _, path::Path};

use chrono::NaiveDateTime;
use itertools::Itertools;

use super::{
    DatasetSample, TIMESTAMP_FORMAT, format_count, format_file_size, now, percentage, strings,
    write_report,
};
use crate::{
    driver::{DriverConfig, ProcessingStats},
    error::ReportError,
    pipeline::Phase,
    table,
};

/// Everything the preprocessing report is built from.
pub struct PreprocessInputs<'a> {
    pub config: &'a DriverConfig,
    pub stats: &'a ProcessingStats,
    pub before: &'a DatasetSample,
    pub after: &'a DatasetSample,
}

/// Before/after comparison of one preprocessing run.
#[derive(Debug, Clone)]
pub struct PreprocessReport {
    pub generated_at: NaiveDateTime,
    pub input: String,
    pub output: String,
    pub window_size: usize,
    pub date_cutoff: String,
    pub stats: ProcessingStats,
    pub columns_before: Vec<String>,
    pub columns_after: Vec<String>,
    pub size_before: u64,
    pub size_after: u64,
    pub memory_before_mb: f64,
    pub memory_after_mb: f64,
    pub types_before: Vec<(String, usize)>,
    pub types_after: Vec<(String, usize)>,
}

impl PreprocessReport {
    pub fn assemble(inputs: PreprocessInputs<'_>) -> Result<Self, ReportError> {
        let PreprocessInputs {
            config,
            stats,
            before,
            after,
        } = inputs;
        if after.frame.is_empty() {
            return Err(ReportError::NoData {
                path: after.path.clone(),
            });
        }
        let distribution = |sample: &DatasetSample| -> Vec<(String, usize)> {
            sample
                .type_distribution()
                .into_iter()
                .map(|(label, count)| (label.to_string(), count))
                .collect()
        };
        Ok(Self {
            generated_at: now(),
            input: config.input.display().to_string(),
            output: config.output.display().to_string(),
            window_size: config.window_size,
            date_cutoff: config.pipeline.date_cutoff.format("%Y-%m-%d").to_string(),
            stats: stats.clone(),
            columns_before: before.frame.column_names(),
            columns_after: after.frame.column_names(),
            size_before: before.file_size,
            size_after: after.file_size,
            memory_before_mb: before.memory_mb(),
            memory_after_mb: after.memory_mb(),
            types_before: distribution(before),
            types_after: distribution(after),
        })
    }

    pub fn added_columns(&self) -> Vec<&str> {
        difference(&self.columns_after, &self.columns_before)
    }

    pub fn removed_columns(&self) -> Vec<&str> {
        difference(&self.columns_before, &self.columns_after)
    }

    pub fn row_reduction_pct(&self) -> f64 {
        percentage(
            self.stats.rows_removed() as f64,
            self.stats.total_rows_input as f64,
        )
    }

    pub fn size_reduction_pct(&self) -> f64 {
        percentage(
            self.size_before as f64 - self.size_after as f64,
            self.size_before as f64,
        )
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "ACCIDENT DATA PREPROCESSING REPORT");
        let _ = writeln!(out, "{}", table::render_rule());
        out.push_str(&table::render_key_values(&[
            ("Generated", self.generated_at.format(TIMESTAMP_FORMAT).to_string()),
            ("Input", self.input.clone()),
            ("Output", self.output.clone()),
            ("Window size", format_count(self.window_size)),
            ("Date cutoff", self.date_cutoff.clone()),
            ("Windows processed", format_count(self.stats.chunks_processed)),
        ]));

        out.push_str(&table::render_heading("ROWS"));
        out.push_str(&table::render_key_values(&[
            ("Input rows", format_count(self.stats.total_rows_input)),
            ("Output rows", format_count(self.stats.total_rows_output)),
            ("Removed rows", format_count(self.stats.rows_removed())),
            ("Reduction", format!("{:.1}%", self.row_reduction_pct())),
        ]));
        let removed_rows = Phase::ALL
            .iter()
            .map(|phase| {
                vec![
                    phase.name().to_string(),
                    format_count(self.stats.removed_by(*phase)),
                ]
            })
            .collect::<Vec<_>>();
        out.push('\n');
        out.push_str(&table::render_table(
            &strings(["phase", "rows removed"]),
            &removed_rows,
        ));

        out.push_str(&table::render_heading("COLUMNS"));
        out.push_str(&table::render_key_values(&[
            ("Columns before", self.columns_before.len().to_string()),
            ("Columns after", self.columns_after.len().to_string()),
            ("Deleted", list_or_none(&self.stats.columns_deleted)),
            ("Time features added", self.stats.time_features_added.to_string()),
            ("Added names", list_or_none(&self.added_columns())),
            ("Removed names", list_or_none(&self.removed_columns())),
        ]));

        out.push_str(&table::render_heading("FILE SIZE AND MEMORY"));
        out.push_str(&table::render_key_values(&[
            ("Input file", format_file_size(self.size_before)),
            ("Output file", format_file_size(self.size_after)),
            ("Size reduction", format!("{:.1}%", self.size_reduction_pct())),
            ("Sample memory before", format!("{:.2} MB", self.memory_before_mb)),
            ("Sample memory after", format!("{:.2} MB", self.memory_after_mb)),
            (
                "Memory delta",
                format!("{:+.2} MB", self.memory_after_mb - self.memory_before_mb),
            ),
        ]));

        out.push_str(&table::render_heading("COLUMN TYPES"));
        out.push_str(&table::render_table(
            &strings(["type", "before", "after"]),
            &merge_distributions(&self.types_before, &self.types_after),
        ));

        out.push_str(&table::render_heading("PIPELINE PHASES"));
        for (idx, phase) in Phase::ALL.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}: {}", idx + 1, phase.name(), phase.description());
        }
        out
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ReportError> {
        write_report(path, &self.render())
    }
}

fn difference<'a>(left: &'a [String], right: &[String]) -> Vec<&'a str> {
    let right = right.iter().map(String::as_str).collect::<BTreeSet<_>>();
    left.iter()
        .map(String::as_str)
        .filter(|name| !right.contains(name))
        .collect()
}

fn list_or_none<S: AsRef<str>>(names: &[S]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.iter().map(|name| -> &str { name.as_ref() }).join(", ")
    }
}

fn merge_distributions(before: &[(String, usize)], after: &[(String, usize)]) -> Vec<Vec<String>> {
    let labels = before
        .iter()
        .chain(after)
        .map(|(label, _)| label.as_str())
        .collect::<BTreeSet<_>>();
    let lookup = |side: &[(String, usize)], label: &str| {
        side.iter()
            .find(|(l, _)| l == label)
            .map(|(_, count)| *count)
            .unwrap_or(0)
            .to_string()
    };
    labels
        .into_iter()
        .map(|label| vec![label.to_string(), lookup(before, label), lookup(after, label)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use std::path::PathBuf;

    fn sample(path: &str, headers: &[&str], rows: &[&[&str]], file_size: u64) -> DatasetSample {
        let headers = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
        let records = rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        DatasetSample {
            path: PathBuf::from(path),
            frame: Frame::from_records(&headers, records),
            total_rows: rows.len(),
            file_size,
        }
    }

    #[test]
    fn empty_output_sample_is_no_data() {
        let config = DriverConfig::new("in.csv", "out.csv");
        let stats = ProcessingStats::default();
        let before = sample("in.csv", &["ID"], &[&["1"]], 10);
        let after = sample("out.csv", &["ID"], &[], 0);
        let err = PreprocessReport::assemble(PreprocessInputs {
            config: &config,
            stats: &stats,
            before: &before,
            after: &after,
        })
        .unwrap_err();
        assert!(matches!(err, ReportError::NoData { .. }));
    }

    #[test]
    fn report_lists_column_changes_and_phase_counts() {
        let config = DriverConfig::new("in.csv", "out.csv");
        let mut stats = ProcessingStats {
            chunks_processed: 1,
            total_rows_input: 4,
            total_rows_output: 2,
            columns_deleted: vec!["ID".to_string()],
            time_features_added: 7,
            ..ProcessingStats::default()
        };
        stats.rows_removed_by_phase.insert(Phase::DateFilter, 2);
        let before = sample("in.csv", &["ID", "City"], &[&["1", "a"]], 2000);
        let after = sample("out.csv", &["CITY", "YEAR"], &[&["a", "2020"]], 1000);
        let report = PreprocessReport::assemble(PreprocessInputs {
            config: &config,
            stats: &stats,
            before: &before,
            after: &after,
        })
        .unwrap();
        assert_eq!(report.added_columns(), vec!["CITY", "YEAR"]);
        assert_eq!(report.removed_columns(), vec!["ID", "City"]);
        assert_eq!(report.row_reduction_pct(), 50.0);
        assert_eq!(report.size_reduction_pct(), 50.0);

        let rendered = report.render();
        assert!(rendered.contains("Reduction:"));
        assert!(rendered.contains("date-filter"));
        assert!(rendered.contains("Deleted:"));
        assert!(rendered.contains("PIPELINE PHASES"));
        assert!(rendered.contains("7. reorder"));
    }
}
