use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Tokens a dataframe reader treats as missing values
const NA_TOKENS: &[&str] = &["NA", "N/A", "NaN", "nan", "null", "NULL", "#N/A"];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TableError {
    #[error("No columns to parse from file")]
    Empty,

    #[error("Expected {expected} fields in line {line}, saw {found}")]
    RaggedRow {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("csv parse error at line {line}: {reason}")]
    Parse { line: u64, reason: String },
}

/// A single typed cell of the processed result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Read a raw field as a member of a column of the given kind
    fn read(raw: &str, kind: ColumnKind) -> Self {
        if is_missing(raw) {
            return CellValue::Empty;
        }
        match kind {
            ColumnKind::Bool => CellValue::Bool(raw.eq_ignore_ascii_case("true")),
            ColumnKind::Int => raw
                .parse()
                .map(CellValue::Int)
                .unwrap_or_else(|_| CellValue::Text(raw.to_string())),
            ColumnKind::Float => raw
                .parse()
                .map(CellValue::Float)
                .unwrap_or_else(|_| CellValue::Text(raw.to_string())),
            ColumnKind::Text => CellValue::Text(raw.to_string()),
        }
    }

    /// Text shown in the preview grid
    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Int(n) => n.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn is_missing(raw: &str) -> bool {
    raw.is_empty() || NA_TOKENS.contains(&raw)
}

/// Type shared by every cell of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int,
    Float,
    Text,
}

impl ColumnKind {
    fn of(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("false") {
            return ColumnKind::Bool;
        }
        if raw.parse::<i64>().is_ok() {
            return ColumnKind::Int;
        }
        match raw.parse::<f64>() {
            Ok(f) if f.is_finite() => ColumnKind::Float,
            _ => ColumnKind::Text,
        }
    }

    /// Narrowest kind every present value of a column fits.
    ///
    /// Integers and floats widen to `Float`; any other disagreement makes the
    /// whole column `Text` so each cell keeps its original spelling.
    fn infer<'a>(values: impl Iterator<Item = &'a str>) -> Self {
        let mut kind = None;
        for raw in values.filter(|raw| !is_missing(raw)) {
            kind = Some(match (kind, ColumnKind::of(raw)) {
                (None, next) => next,
                (Some(current), next) if current == next => current,
                (Some(ColumnKind::Int), ColumnKind::Float)
                | (Some(ColumnKind::Float), ColumnKind::Int) => ColumnKind::Float,
                _ => return ColumnKind::Text,
            });
        }
        kind.unwrap_or(ColumnKind::Text)
    }
}

/// Rows of named columns, as returned by the remote endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    /// Parse a comma-delimited body whose first record is the header.
    ///
    /// Each column gets a single type, decided from all of its values; a
    /// column with any non-numeric entry keeps every cell as text.
    pub fn from_csv(text: &str) -> Result<Table, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut records = reader.records();

        let header = match records.next() {
            Some(record) => record.map_err(map_csv_error)?,
            None => return Err(TableError::Empty),
        };
        if header.iter().all(|field| field.trim().is_empty()) && header.len() <= 1 {
            return Err(TableError::Empty);
        }
        let columns = normalize_headers(header.iter());

        let mut raw_rows: Vec<Vec<String>> = Vec::new();
        for record in records {
            let record = record.map_err(map_csv_error)?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            if record.len() > columns.len() {
                return Err(TableError::RaggedRow {
                    line,
                    expected: columns.len(),
                    found: record.len(),
                });
            }

            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(columns.len(), String::new());
            raw_rows.push(row);
        }

        let kinds: Vec<ColumnKind> = (0..columns.len())
            .map(|c| ColumnKind::infer(raw_rows.iter().map(|row| row[c].as_str())))
            .collect();

        let rows = raw_rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&kinds)
                    .map(|(raw, kind)| CellValue::read(raw, *kind))
                    .collect()
            })
            .collect();

        Ok(Table { columns, rows })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// One JSON object per row, keyed by column name
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(column, cell)| (column.clone(), cell.to_json()))
                    .collect()
            })
            .collect()
    }

    /// Rows rendered as display strings for the preview grid
    pub fn display_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(CellValue::display).collect())
            .collect()
    }
}

// Blank headers become "Unnamed: i" and repeats get ".1", ".2", ... suffixes.
fn normalize_headers<'a>(fields: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut columns = Vec::new();

    for (index, field) in fields.enumerate() {
        let base = if field.trim().is_empty() {
            format!("Unnamed: {}", index)
        } else {
            field.to_string()
        };

        let mut name = base.clone();
        while let Some(count) = seen.get_mut(&name) {
            *count += 1;
            name = format!("{}.{}", base, count);
        }
        seen.insert(name.clone(), 0);
        columns.push(name);
    }

    columns
}

fn map_csv_error(err: csv::Error) -> TableError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    TableError::Parse {
        line,
        reason: err.to_string(),
    }
}
