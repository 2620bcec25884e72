//! Columnar row window.
//!
//! A [`Frame`] holds one window of records as typed columns. Frames are built
//! from decoded CSV records, either inferring each column's type from the
//! records at hand or parsing them as types settled for the whole input, and
//! rendered back to CSV cells when a window is written.

use std::collections::HashSet;

use crate::data::{SourceType, Value, is_na_token, parse_boolean_token};

/// Running evidence for one column's type, fed one text cell at a time.
#[derive(Debug, Clone, Copy)]
pub struct TypeCandidate {
    non_null: usize,
    integer: bool,
    float: bool,
    boolean: bool,
}

impl Default for TypeCandidate {
    fn default() -> Self {
        Self {
            non_null: 0,
            integer: true,
            float: true,
            boolean: true,
        }
    }
}

impl TypeCandidate {
    pub fn observe(&mut self, cell: &str) {
        if is_na_token(cell) {
            return;
        }
        self.non_null += 1;
        let trimmed = cell.trim();
        if self.integer && trimmed.parse::<i64>().is_err() {
            self.integer = false;
        }
        if self.float && trimmed.parse::<f64>().is_err() {
            self.float = false;
        }
        if self.boolean
            && !trimmed.eq_ignore_ascii_case("true")
            && !trimmed.eq_ignore_ascii_case("false")
        {
            self.boolean = false;
        }
    }

    pub fn resolve(&self) -> SourceType {
        if self.non_null == 0 {
            // An all-null column reads back as float, like an all-NaN series.
            SourceType::Float64
        } else if self.integer {
            SourceType::Int64
        } else if self.float {
            SourceType::Float64
        } else if self.boolean {
            SourceType::Boolean
        } else {
            SourceType::String
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub dtype: SourceType,
    pub values: Vec<Option<Value>>,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: SourceType, values: Vec<Option<Value>>) -> Self {
        Self {
            name: name.into(),
            dtype,
            values,
        }
    }

    /// Infers a column type from raw text cells, the way a dataframe reader would.
    pub fn infer(name: impl Into<String>, raw: Vec<String>) -> Self {
        let mut candidate = TypeCandidate::default();
        for cell in &raw {
            candidate.observe(cell);
        }
        Self::parse(name, candidate.resolve(), raw)
    }

    /// Parses raw text cells as `dtype`. Cells that do not parse become null.
    pub fn parse(name: impl Into<String>, dtype: SourceType, raw: Vec<String>) -> Self {
        let values = raw
            .into_iter()
            .map(|cell| {
                if is_na_token(&cell) {
                    return None;
                }
                match dtype {
                    SourceType::Int64 => cell.trim().parse().ok().map(Value::Integer),
                    SourceType::Float64 => cell.trim().parse().ok().map(Value::Float),
                    SourceType::Boolean => parse_boolean_token(&cell).map(Value::Boolean),
                    _ => Some(Value::String(cell)),
                }
            })
            .collect();

        Self {
            name: name.into(),
            dtype,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn non_null(&self) -> impl Iterator<Item = &Value> {
        self.values.iter().filter_map(|v| v.as_ref())
    }

    pub fn retain_rows(&mut self, keep: &[bool]) {
        let mut idx = 0;
        self.values.retain(|_| {
            let kept = keep.get(idx).copied().unwrap_or(false);
            idx += 1;
            kept
        });
    }

    /// Approximate in-memory footprint of the column's cells.
    pub fn estimated_memory_bytes(&self) -> usize {
        let cell = std::mem::size_of::<Option<Value>>();
        let heap: usize = self
            .non_null()
            .map(|value| match value {
                Value::String(s) => s.capacity(),
                _ => 0,
            })
            .sum();
        self.values.len() * cell + heap + self.name.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<Column>,
}

impl Frame {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Builds a window from decoded records, inferring a type for every column.
    pub fn from_records(headers: &[String], records: Vec<Vec<String>>) -> Self {
        let columns = headers
            .iter()
            .zip(split_columns(headers.len(), records))
            .map(|(name, raw)| Column::infer(name.clone(), raw))
            .collect();
        Self { columns }
    }

    /// Builds a window whose column types were settled beforehand; a column
    /// without a type reads as text.
    pub fn from_typed_records(
        headers: &[String],
        types: &[SourceType],
        records: Vec<Vec<String>>,
    ) -> Self {
        let columns = headers
            .iter()
            .zip(split_columns(headers.len(), records))
            .enumerate()
            .map(|(idx, (name, raw))| {
                let dtype = types.get(idx).copied().unwrap_or(SourceType::String);
                Column::parse(name.clone(), dtype, raw)
            })
            .collect();
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Appends a column, replacing an existing one with the same name in place.
    pub fn push_column(&mut self, column: Column) {
        match self.column_index(&column.name) {
            Some(idx) => self.columns[idx] = column,
            None => self.columns.push(column),
        }
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        self.column_index(name).map(|idx| self.columns.remove(idx))
    }

    /// Drops every listed column that is present; returns how many were dropped.
    pub fn drop_columns<S: AsRef<str>>(&mut self, names: &[S]) -> usize {
        let doomed: HashSet<&str> = names.iter().map(|n| n.as_ref()).collect();
        let before = self.columns.len();
        self.columns.retain(|c| !doomed.contains(c.name.as_str()));
        before - self.columns.len()
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column_mut(from) {
            Some(column) => {
                column.name = to.to_string();
                true
            }
            None => false,
        }
    }

    pub fn retain_rows(&mut self, keep: &[bool]) {
        for column in &mut self.columns {
            column.retain_rows(keep);
        }
    }

    /// Reorders columns by index permutation; indices not listed are dropped.
    pub fn reorder(&mut self, order: &[usize]) {
        let mut slots: Vec<Option<Column>> = std::mem::take(&mut self.columns)
            .into_iter()
            .map(Some)
            .collect();
        self.columns = order
            .iter()
            .filter_map(|idx| slots.get_mut(*idx).and_then(Option::take))
            .collect();
    }

    /// Renders row `idx` as CSV cells; nulls become empty strings.
    pub fn row_cells(&self, idx: usize) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| {
                column
                    .values
                    .get(idx)
                    .and_then(|v| v.as_ref())
                    .map(Value::as_display)
                    .unwrap_or_default()
            })
            .collect()
    }

    pub fn estimated_memory_bytes(&self) -> usize {
        self.columns.iter().map(Column::estimated_memory_bytes).sum()
    }
}

/// Transposes row records into per-column text, padding short rows with
/// empty cells.
fn split_columns(width: usize, records: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let mut raw_columns: Vec<Vec<String>> = (0..width)
        .map(|_| Vec::with_capacity(records.len()))
        .collect();
    for record in records {
        let mut cells = record.into_iter();
        for column in raw_columns.iter_mut() {
            column.push(cells.next().unwrap_or_default());
        }
    }
    raw_columns
}
