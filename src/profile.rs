//! Per-column descriptive statistics.
//!
//! [`characterize`] walks a column once and collects null counts,
//! cardinality, and either character-length statistics (text columns) or
//! numeric moments (numeric and boolean columns). These feed the type mapper
//! and every report.

use std::collections::HashMap;

use serde::Serialize;

use crate::{
    data::{SourceType, Value},
    frame::{Column, Frame},
    types::{self, InterchangeType, SqlType},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LengthStats {
    pub min: usize,
    pub max: usize,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation; `None` with fewer than two values.
    pub std_dev: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub source_type: SourceType,
    pub non_null_count: usize,
    pub null_count: usize,
    pub null_percentage: f64,
    pub unique_count: usize,
    /// Longest value in characters for text columns, 0 otherwise.
    pub observed_max_length: usize,
    pub lengths: Option<LengthStats>,
    pub numbers: Option<NumericStats>,
    pub most_frequent: Option<String>,
    pub estimated_memory_bytes: usize,
}

impl ColumnProfile {
    pub fn total_count(&self) -> usize {
        self.non_null_count + self.null_count
    }

    pub fn target_type(&self) -> SqlType {
        types::map_to_target_type(self.source_type, &self.name, self.observed_max_length)
    }

    pub fn interchange_type(&self) -> InterchangeType {
        self.target_type().interchange()
    }

    /// Distinct values over total rows; 0 for an empty column.
    pub fn cardinality_ratio(&self) -> f64 {
        let total = self.total_count();
        if total == 0 {
            0.0
        } else {
            self.unique_count as f64 / total as f64
        }
    }

    pub fn estimated_memory_mb(&self) -> f64 {
        self.estimated_memory_bytes as f64 / (1024.0 * 1024.0)
    }
}

pub fn characterize(column: &Column) -> ColumnProfile {
    let mut null_count = 0usize;
    let mut distinct: HashMap<String, usize> = HashMap::new();
    let mut lengths = MomentAccumulator::default();
    let mut numbers = MomentAccumulator::default();

    for cell in &column.values {
        let Some(value) = cell else {
            null_count += 1;
            continue;
        };
        *distinct.entry(distinct_key(value)).or_insert(0) += 1;
        if column.dtype.is_text() {
            let rendered = value.as_display();
            lengths.add(rendered.chars().count() as f64);
        } else if column.dtype.is_numeric()
            && let Some(numeric) = value.as_f64()
        {
            numbers.add(numeric);
        }
    }

    let total = column.values.len();
    let non_null_count = total - null_count;
    let null_percentage = if total == 0 {
        0.0
    } else {
        null_count as f64 / total as f64 * 100.0
    };

    let length_stats = lengths.finish().map(|moments| LengthStats {
        min: moments.min as usize,
        max: moments.max as usize,
        mean: moments.mean,
    });
    let numeric_stats = numbers.finish().map(|moments| NumericStats {
        min: moments.min,
        max: moments.max,
        mean: moments.mean,
        std_dev: moments.std_dev,
    });
    let most_frequent = most_frequent_value(&distinct);

    ColumnProfile {
        name: column.name.clone(),
        source_type: column.dtype,
        non_null_count,
        null_count,
        null_percentage,
        unique_count: distinct.len(),
        observed_max_length: length_stats.as_ref().map(|l| l.max).unwrap_or(0),
        lengths: length_stats,
        numbers: numeric_stats,
        most_frequent,
        estimated_memory_bytes: column.estimated_memory_bytes(),
    }
}

pub fn characterize_frame(frame: &Frame) -> Vec<ColumnProfile> {
    frame.columns().iter().map(characterize).collect()
}

fn distinct_key(value: &Value) -> String {
    value.as_display()
}

fn most_frequent_value(distinct: &HashMap<String, usize>) -> Option<String> {
    distinct
        .iter()
        .max_by(|(left_key, left), (right_key, right)| {
            left.cmp(right).then_with(|| right_key.cmp(left_key))
        })
        .map(|(key, _)| key.clone())
}

#[derive(Debug, Default)]
struct MomentAccumulator {
    count: usize,
    sum: f64,
    sum_squares: f64,
    min: Option<f64>,
    max: Option<f64>,
}

struct Moments {
    min: f64,
    max: f64,
    mean: f64,
    std_dev: Option<f64>,
}

impl MomentAccumulator {
    fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_squares += value * value;
        self.min = Some(match self.min {
            Some(current) => current.min(value),
            None => value,
        });
        self.max = Some(match self.max {
            Some(current) => current.max(value),
            None => value,
        });
    }

    fn finish(&self) -> Option<Moments> {
        let (min, max) = (self.min?, self.max?);
        let mean = self.sum / self.count as f64;
        let std_dev = (self.count >= 2).then(|| {
            let variance =
                (self.sum_squares - self.count as f64 * mean * mean) / (self.count as f64 - 1.0);
            variance.max(0.0).sqrt()
        });
        Some(Moments {
            min,
            max,
            mean,
            std_dev,
        })
    }
}
