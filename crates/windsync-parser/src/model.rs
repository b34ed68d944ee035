use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ParserError;

const BATCH: &str = "RAW_BATCH";

/// A single cell as read from a source file, before any schema is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    Null,
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Classifies a textual cell: null tokens become `Null`, numeric text becomes `Number`.
    /// Non-finite numbers (`NaN`, `inf`) are treated as missing.
    pub fn from_cell(cell: &str, options: &ReadOptions) -> Self {
        let trimmed = cell.trim();
        if options.is_null_token(trimmed) {
            return RawValue::Null;
        }
        match trimmed.parse::<f64>() {
            Ok(parsed) if !parsed.is_finite() => RawValue::Null,
            Ok(parsed) => RawValue::Number(parsed),
            Err(_) => RawValue::Text(trimmed.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Number(value) if value.is_finite() => Some(*value),
            RawValue::Text(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite()),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => Ok(()),
            RawValue::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                write!(f, "{}", *value as i64)
            }
            RawValue::Number(value) => write!(f, "{value}"),
            RawValue::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    pub delimiter: char,
    pub null_tokens: Vec<String>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            null_tokens: ["", "nan", "na", "null", "none"]
                .iter()
                .map(|token| token.to_string())
                .collect(),
        }
    }
}

impl ReadOptions {
    pub fn is_null_token(&self, value: &str) -> bool {
        self.null_tokens
            .iter()
            .any(|token| token.eq_ignore_ascii_case(value))
    }
}

/// An immutable table of raw records read from one source.
///
/// Columns keep their file order; every row has exactly one value per column.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBatch {
    source: String,
    columns: Vec<String>,
    rows: Vec<Vec<RawValue>>,
}

impl RawBatch {
    pub fn new(
        source: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<RawValue>>,
    ) -> Result<Self, ParserError> {
        let mut seen: HashMap<&str, usize> = HashMap::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            if let Some(previous) = seen.insert(column.as_str(), idx) {
                return Err(ParserError::InvalidHeader {
                    parser: BATCH,
                    message: format!(
                        "column '{column}' appears at positions {previous} and {idx}"
                    ),
                });
            }
        }

        for (line_index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(ParserError::DataRow {
                    parser: BATCH,
                    line_index,
                    message: format!(
                        "expected {} fields, found {}",
                        columns.len(),
                        row.len()
                    ),
                });
            }
        }

        Ok(Self {
            source: source.into(),
            columns,
            rows,
        })
    }

    /// Builds a batch from mapping-style records. The header is the union of keys in
    /// first-seen order; keys absent from a record read as `Null`.
    pub fn from_records<K, I, R>(source: impl Into<String>, records: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (K, RawValue)>,
    {
        let mut columns: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut sparse_rows: Vec<Vec<(usize, RawValue)>> = Vec::new();

        for record in records {
            let mut cells = Vec::new();
            for (key, value) in record {
                let key = key.into();
                let idx = match positions.get(&key) {
                    Some(idx) => *idx,
                    None => {
                        let idx = columns.len();
                        positions.insert(key.clone(), idx);
                        columns.push(key);
                        idx
                    }
                };
                cells.push((idx, value));
            }
            sparse_rows.push(cells);
        }

        let width = columns.len();
        let rows = sparse_rows
            .into_iter()
            .map(|cells| {
                let mut row = vec![RawValue::Null; width];
                for (idx, value) in cells {
                    row[idx] = value;
                }
                row
            })
            .collect();

        Self {
            source: source.into(),
            columns,
            rows,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn rows(&self) -> &[Vec<RawValue>] {
        &self.rows
    }

    pub fn value(&self, row: usize, column: usize) -> Option<&RawValue> {
        self.rows.get(row).and_then(|values| values.get(column))
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
