use std::{collections::BTreeMap, fmt::Write as _, path::Path};

use chrono::NaiveDateTime;
use itertools::Itertools;

use super::{
    DatasetSample, TIMESTAMP_FORMAT, format_count, format_metric, now, strings, write_report,
};
use crate::{
    error::ReportError,
    pipeline,
    profile::{self, ColumnProfile},
    table,
    types::{self, SqlType},
};

pub const DEFAULT_TABLE_NAME: &str = "US_Accidents";
const HIGH_NULL_PERCENTAGE: f64 = 50.0;

/// Column-by-column SQL Server mapping for one sampled CSV file.
#[derive(Debug, Clone)]
pub struct TypeConversionReport {
    pub generated_at: NaiveDateTime,
    pub source: String,
    pub table_name: String,
    pub sample_rows: usize,
    pub profiles: Vec<ColumnProfile>,
}

impl TypeConversionReport {
    pub fn assemble(sample: &DatasetSample, table_name: &str) -> Result<Self, ReportError> {
        if sample.frame.is_empty() {
            return Err(ReportError::NoData {
                path: sample.path.clone(),
            });
        }
        Ok(Self {
            generated_at: now(),
            source: sample.path.display().to_string(),
            table_name: table_name.to_string(),
            sample_rows: sample.sample_rows(),
            profiles: profile::characterize_frame(&sample.frame),
        })
    }

    pub fn type_counts(&self) -> BTreeMap<SqlType, usize> {
        sql_type_distribution(&self.profiles)
    }

    pub fn high_null_columns(&self) -> Vec<&ColumnProfile> {
        self.profiles
            .iter()
            .filter(|p| p.null_percentage > HIGH_NULL_PERCENTAGE)
            .collect()
    }

    pub fn long_string_columns(&self) -> Vec<&ColumnProfile> {
        self.profiles
            .iter()
            .filter(|p| p.target_type().is_long_string())
            .collect()
    }

    /// Integer columns the pipeline holds narrower than the type mapped here,
    /// paired with the type their in-memory width would map to. CSV text
    /// carries no integer width, so a re-read output profiles them as int64.
    pub fn widened_integer_columns(&self) -> Vec<(&ColumnProfile, SqlType)> {
        self.profiles
            .iter()
            .filter(|p| p.source_type.is_integer())
            .filter_map(|p| {
                let width = pipeline::fixed_integer_width(&p.name)?;
                let narrow = types::map_to_target_type(width, &p.name, p.observed_max_length);
                (narrow != p.target_type()).then_some((p, narrow))
            })
            .collect()
    }

    pub fn total_memory_mb(&self) -> f64 {
        self.profiles.iter().map(ColumnProfile::estimated_memory_mb).sum()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "SOURCE TYPE -> SQL SERVER TYPE CONVERSION REPORT");
        let _ = writeln!(out, "{}", table::render_rule());
        out.push_str(&table::render_key_values(&[
            ("File", self.source.clone()),
            ("Generated", self.generated_at.format(TIMESTAMP_FORMAT).to_string()),
            ("Sample rows", format_count(self.sample_rows)),
            ("Columns", self.profiles.len().to_string()),
        ]));

        out.push_str(&table::render_heading("CONVERSION TABLE"));
        out.push_str(&conversion_table(&self.profiles));

        out.push_str(&table::render_heading("SQL SERVER TYPE DISTRIBUTION"));
        out.push_str(&distribution_table(&self.profiles));

        out.push_str(&table::render_heading("CREATE TABLE SCRIPT"));
        out.push_str(&create_table_script(&self.table_name, &self.profiles));
        out.push('\n');

        out.push_str(&table::render_heading("OPTIMIZATION NOTES"));
        let high_null = self.high_null_columns();
        if !high_null.is_empty() {
            let _ = writeln!(
                out,
                "  {} column(s) are more than {HIGH_NULL_PERCENTAGE:.0}% null: {}",
                high_null.len(),
                names(&high_null)
            );
        }
        let long_strings = self.long_string_columns();
        if !long_strings.is_empty() {
            let _ = writeln!(
                out,
                "  {} column(s) need long strings (NVARCHAR(4000) or wider): {}",
                long_strings.len(),
                names(&long_strings)
            );
        }
        let widened = self.widened_integer_columns();
        if !widened.is_empty() {
            let _ = writeln!(
                out,
                "  {} column(s) are read back from CSV without their integer width; \
                 the pipeline holds them as {}",
                widened.len(),
                widened
                    .iter()
                    .map(|(p, narrow)| format!("{} {narrow}", p.name))
                    .join(", ")
            );
        }
        let _ = writeln!(
            out,
            "  Total estimated sample memory: {:.2} MB",
            self.total_memory_mb()
        );
        out
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ReportError> {
        write_report(path, &self.render())
    }
}

pub(super) fn conversion_table(profiles: &[ColumnProfile]) -> String {
    let rows = profiles
        .iter()
        .map(|p| {
            let (min, max) = match (&p.numbers, &p.lengths) {
                (Some(numbers), _) => (format_metric(Some(numbers.min)), format_metric(Some(numbers.max))),
                (None, Some(lengths)) => (lengths.min.to_string(), lengths.max.to_string()),
                (None, None) => ("N/A".to_string(), "N/A".to_string()),
            };
            vec![
                p.name.clone(),
                p.source_type.label().to_string(),
                p.target_type().to_string(),
                p.interchange_type().to_string(),
                format_count(p.non_null_count),
                format_count(p.null_count),
                format!("{:.1}%", p.null_percentage),
                format_count(p.unique_count),
                format!("{:.2}", p.estimated_memory_mb()),
                p.observed_max_length.to_string(),
                min,
                max,
            ]
        })
        .collect::<Vec<_>>();
    table::render_table(
        &strings([
            "column",
            "source type",
            "sql type",
            "ssis type",
            "non-null",
            "null",
            "null %",
            "unique",
            "memory mb",
            "max len",
            "min",
            "max",
        ]),
        &rows,
    )
}

/// `CREATE TABLE` statement with one bracketed column per profile. Columns
/// without nulls in the sample are declared `NOT NULL`.
pub fn create_table_script(table_name: &str, profiles: &[ColumnProfile]) -> String {
    let columns = profiles
        .iter()
        .map(|p| {
            let nullability = if p.null_count == 0 { "NOT NULL" } else { "NULL" };
            format!("    [{}] {} {nullability}", p.name, p.target_type())
        })
        .join(",\n");
    format!("CREATE TABLE [{table_name}] (\n{columns}\n);")
}

fn names(profiles: &[&ColumnProfile]) -> String {
    profiles.iter().map(|p| p.name.as_str()).join(", ")
}

pub(super) fn distribution_table(profiles: &[ColumnProfile]) -> String {
    let counts = sql_type_distribution(profiles)
        .into_iter()
        .map(|(sql_type, count)| vec![sql_type.to_string(), count.to_string()])
        .collect::<Vec<_>>();
    table::render_table(&strings(["sql type", "columns"]), &counts)
}

/// Column count per mapped SQL type across `profiles`.
pub(super) fn sql_type_distribution(profiles: &[ColumnProfile]) -> BTreeMap<SqlType, usize> {
    let mut counts = BTreeMap::new();
    for profile in profiles {
        *counts.entry(profile.target_type()).or_insert(0) += 1;
    }
    counts
}
