use csv::ReaderBuilder;

use crate::errors::ParserError;
use crate::model::{RawBatch, RawValue, ReadOptions};
use crate::registry::RawBatchParser;

/// Delimited text with a single header row, as exported by the farm historians and the
/// turbine SCADA dumps.
pub struct CsvTableParser;

impl Default for CsvTableParser {
    fn default() -> Self {
        Self
    }
}

impl CsvTableParser {
    const NAME: &'static str = "CSV_TABLE";

    fn delimiter(options: &ReadOptions) -> Result<u8, ParserError> {
        if options.delimiter.is_ascii() {
            Ok(options.delimiter as u8)
        } else {
            Err(ParserError::InvalidHeader {
                parser: Self::NAME,
                message: format!("delimiter '{}' is not a single byte", options.delimiter),
            })
        }
    }
}

impl RawBatchParser for CsvTableParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(
        &self,
        source: &str,
        content: &str,
        options: &ReadOptions,
    ) -> Result<RawBatch, ParserError> {
        let content = content.trim_start_matches('\u{feff}');
        if content.trim().is_empty() {
            return Err(ParserError::EmptyData { parser: Self::NAME });
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(Self::delimiter(options)?)
            .from_reader(content.as_bytes());

        let columns: Vec<String> = reader
            .headers()
            .map_err(|source| ParserError::Csv {
                parser: Self::NAME,
                source,
            })?
            .iter()
            .map(|label| label.trim().to_string())
            .collect();

        if columns.len() < 2 {
            return Err(ParserError::FormatMismatch {
                parser: Self::NAME,
                reason: format!(
                    "expected at least 2 header fields, found {}",
                    columns.len()
                ),
            });
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| ParserError::Csv {
                parser: Self::NAME,
                source,
            })?;
            rows.push(
                record
                    .iter()
                    .map(|cell| RawValue::from_cell(cell, options))
                    .collect(),
            );
        }

        RawBatch::new(source, columns, rows).map_err(|err| match err {
            ParserError::InvalidHeader { message, .. } => ParserError::InvalidHeader {
                parser: Self::NAME,
                message,
            },
            other => other,
        })
    }
}
