use serde_json::{Map, Value};

use crate::errors::ParserError;
use crate::model::{RawBatch, RawValue, ReadOptions};
use crate::registry::RawBatchParser;

/// Either a JSON array of flat objects or newline-delimited objects.
pub struct JsonRecordsParser;

impl Default for JsonRecordsParser {
    fn default() -> Self {
        Self
    }
}

impl JsonRecordsParser {
    const NAME: &'static str = "JSON_RECORDS";

    fn parse_array(content: &str) -> Result<Vec<Map<String, Value>>, ParserError> {
        serde_json::from_str(content).map_err(|source| ParserError::Json {
            parser: Self::NAME,
            source,
        })
    }

    fn parse_lines(content: &str) -> Result<Vec<Map<String, Value>>, ParserError> {
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|source| ParserError::Json {
                    parser: Self::NAME,
                    source,
                })
            })
            .collect()
    }

    fn convert(
        value: Value,
        line_index: usize,
        key: &str,
        options: &ReadOptions,
    ) -> Result<RawValue, ParserError> {
        match value {
            Value::Null => Ok(RawValue::Null),
            Value::Number(number) => Ok(number
                .as_f64()
                .filter(|v| !v.is_nan())
                .map(RawValue::Number)
                .unwrap_or(RawValue::Null)),
            Value::String(text) => Ok(RawValue::from_cell(&text, options)),
            Value::Bool(flag) => Ok(RawValue::Text(flag.to_string())),
            Value::Array(_) | Value::Object(_) => Err(ParserError::DataRow {
                parser: Self::NAME,
                line_index,
                message: format!("field '{key}' is not a scalar"),
            }),
        }
    }
}

impl RawBatchParser for JsonRecordsParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(
        &self,
        source: &str,
        content: &str,
        options: &ReadOptions,
    ) -> Result<RawBatch, ParserError> {
        let trimmed = content.trim_start_matches('\u{feff}').trim_start();
        let objects = match trimmed.chars().next() {
            Some('[') => Self::parse_array(trimmed)?,
            Some('{') => Self::parse_lines(trimmed)?,
            Some(other) => {
                return Err(ParserError::FormatMismatch {
                    parser: Self::NAME,
                    reason: format!("content starts with '{other}', expected '[' or '{{'"),
                })
            }
            None => return Err(ParserError::EmptyData { parser: Self::NAME }),
        };

        let mut records = Vec::with_capacity(objects.len());
        for (line_index, object) in objects.into_iter().enumerate() {
            let mut record = Vec::with_capacity(object.len());
            for (key, value) in object {
                let raw = Self::convert(value, line_index, &key, options)?;
                record.push((key, raw));
            }
            records.push(record);
        }

        Ok(RawBatch::from_records(source, records))
    }
}
