use crate::errors::{ParserAttempt, ParserError};
use crate::formats::{CsvTableParser, JsonRecordsParser};
use crate::model::{RawBatch, ReadOptions};

const REGISTRY: &str = "REGISTRY";

pub trait RawBatchParser {
    fn name(&self) -> &'static str;
    fn parse(
        &self,
        source: &str,
        content: &str,
        options: &ReadOptions,
    ) -> Result<RawBatch, ParserError>;
}

/// Reads one source file with every known raw reader, JSON first since CSV accepts almost
/// anything.
pub fn parse_raw_batch(
    source: &str,
    content: &str,
    options: &ReadOptions,
) -> Result<RawBatch, ParserError> {
    let json_records = JsonRecordsParser;
    let csv_table = CsvTableParser;
    let parsers: [&dyn RawBatchParser; 2] = [&json_records, &csv_table];
    parse_with_parsers(source, content, options, &parsers)
}

/// Offers `content` to each reader in turn. A reader that reports a format mismatch hands
/// over to the next one; any other error is final for the source.
pub fn parse_with_parsers(
    source: &str,
    content: &str,
    options: &ReadOptions,
    parsers: &[&dyn RawBatchParser],
) -> Result<RawBatch, ParserError> {
    let content = content.trim_start_matches('\u{feff}');
    if content.trim().is_empty() {
        return Err(ParserError::EmptyData { parser: REGISTRY });
    }

    let mut attempts = Vec::with_capacity(parsers.len());
    for parser in parsers {
        let reason = match parser.parse(source, content, options) {
            Ok(batch) => return Ok(batch),
            Err(ParserError::FormatMismatch { reason, .. }) => reason,
            Err(err) => return Err(err),
        };
        attempts.push(ParserAttempt::new(parser.name(), reason));
    }

    Err(ParserError::NoMatchingParser {
        source_id: source.to_string(),
        attempts,
    })
}
