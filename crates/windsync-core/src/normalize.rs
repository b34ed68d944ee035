use chrono::offset::LocalResult;
use chrono::{DateTime, NaiveDateTime, TimeZone as _};
use chrono_tz::Tz;
use tracing::{debug, info, warn};
use windsync_parser::{RawBatch, RawValue};

use crate::audit::{audit_checkpoint, Checkpoint, QualitySink};
use crate::config::{default_artifact_columns, TimestampAlias, TimestampKind};
use crate::error::{HarmonizeError, Result};
use crate::series::{CanonicalSeries, Channel, KeyColumn, TIMESTAMP_FIELD};

const MICROS_PER_SECOND: f64 = 1_000_000.0;
const MICROS_PER_MILLI: f64 = 1_000.0;

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%:z"];
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// How a raw batch is mapped onto the canonical shape.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaSettings {
    /// Recognized timestamp columns, in priority order.
    pub aliases: Vec<TimestampAlias>,
    /// Zone used for wall-clock timestamps without an explicit offset.
    pub timezone: Tz,
    /// Source-format columns with no meaning (row indices and the like).
    pub artifact_columns: Vec<String>,
    /// Discriminator lifted out of the channels for stitching.
    pub key_field: Option<String>,
}

impl SchemaSettings {
    pub fn new(aliases: Vec<TimestampAlias>) -> Self {
        Self {
            aliases,
            timezone: Tz::UTC,
            artifact_columns: default_artifact_columns(),
            key_field: None,
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_artifact_columns(mut self, columns: Vec<String>) -> Self {
        self.artifact_columns = columns;
        self
    }

    pub fn with_key_field(mut self, field: impl Into<String>) -> Self {
        self.key_field = Some(field.into());
        self
    }
}

enum ColumnUse {
    Timestamp,
    Skip,
    Key,
    Channel,
}

/// Maps a raw batch onto a canonical series labelled with the batch source.
///
/// The first alias (in settings order) present in the batch becomes the `timestamp` field;
/// a missing alias or any unparsable timestamp fails the whole batch. Artifact columns
/// and records with no raw value outside the timestamp are dropped, and rows are stably
/// sorted by time. The result is audited at [`Checkpoint::Ingest`] before it is returned.
pub fn normalize_batch(
    batch: &RawBatch,
    settings: &SchemaSettings,
    sink: &dyn QualitySink,
) -> Result<CanonicalSeries> {
    let source = batch.source();

    let mut present = settings
        .aliases
        .iter()
        .filter_map(|alias| batch.column_index(&alias.column).map(|idx| (alias, idx)));
    let (alias, ts_idx) = present.next().ok_or_else(|| {
        let names: Vec<&str> = settings.aliases.iter().map(|a| a.column.as_str()).collect();
        HarmonizeError::schema(
            source,
            format!("no recognized timestamp column; expected one of {names:?}"),
        )
    })?;
    let shadowed: Vec<usize> = present.map(|(_, idx)| idx).collect();
    if !shadowed.is_empty() {
        warn!(
            source,
            timestamp_column = %alias.column,
            ignored = shadowed.len(),
            "several timestamp aliases present; using the first recognized one"
        );
    }

    let mut roles = Vec::with_capacity(batch.width());
    let mut key_idx = None;
    for (idx, column) in batch.columns().iter().enumerate() {
        let role = if idx == ts_idx {
            ColumnUse::Timestamp
        } else if shadowed.contains(&idx) || settings.artifact_columns.contains(column) {
            ColumnUse::Skip
        } else if settings.key_field.as_deref() == Some(column.as_str()) {
            key_idx = Some(idx);
            ColumnUse::Key
        } else if column == TIMESTAMP_FIELD {
            return Err(HarmonizeError::schema(
                source,
                format!(
                    "column '{TIMESTAMP_FIELD}' collides with the canonical timestamp field"
                ),
            ));
        } else {
            ColumnUse::Channel
        };
        roles.push(role);
    }

    if let (Some(field), None) = (settings.key_field.as_deref(), key_idx) {
        return Err(HarmonizeError::schema(
            source,
            format!("discriminator column '{field}' is missing"),
        ));
    }

    let height = batch.height();
    let mut timestamps = Vec::with_capacity(height);
    for (row, values) in batch.rows().iter().enumerate() {
        let ts = parse_timestamp(&values[ts_idx], alias.kind, settings.timezone).map_err(
            |reason| {
                HarmonizeError::schema(
                    source,
                    format!("row {row}: column '{}': {reason}", alias.column),
                )
            },
        )?;
        timestamps.push(ts);
    }

    let mut channels: Vec<Channel> = Vec::new();
    let mut coerced = 0usize;
    for (idx, role) in roles.iter().enumerate() {
        if let ColumnUse::Channel = role {
            let values: Vec<Option<f64>> = batch
                .rows()
                .iter()
                .map(|row| {
                    let value = row[idx].as_f64();
                    if value.is_none() && !row[idx].is_null() {
                        coerced += 1;
                    }
                    value
                })
                .collect();
            channels.push(Channel::new(batch.columns()[idx].clone(), values));
        }
    }
    if coerced > 0 {
        debug!(source, coerced, "non-numeric channel values treated as missing");
    }

    let key_values: Option<Vec<Option<String>>> = key_idx.map(|idx| {
        batch
            .rows()
            .iter()
            .map(|row| match &row[idx] {
                RawValue::Null => None,
                other => Some(other.to_string()),
            })
            .collect()
    });

    // Emptiness is judged on the raw cells, so a record holding only text is kept.
    let mut order: Vec<usize> = batch
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, values)| {
            roles
                .iter()
                .zip(values.iter())
                .any(|(role, value)| {
                    matches!(role, ColumnUse::Channel | ColumnUse::Key) && !value.is_null()
                })
        })
        .map(|(row, _)| row)
        .collect();
    let discarded = height - order.len();
    order.sort_by_key(|&row| timestamps[row]);

    let sorted_timestamps = order.iter().map(|&row| timestamps[row]).collect();
    let sorted_channels = channels
        .into_iter()
        .map(|channel| Channel {
            values: order.iter().map(|&row| channel.values[row]).collect(),
            name: channel.name,
        })
        .collect();
    let key = match (settings.key_field.as_ref(), key_values) {
        (Some(field), Some(values)) => Some(KeyColumn {
            field: field.clone(),
            values: order.iter().map(|&row| values[row].clone()).collect(),
        }),
        _ => None,
    };

    let series = CanonicalSeries::with_key(source, sorted_timestamps, sorted_channels, key)?;

    info!(
        source,
        timestamp_column = %alias.column,
        rows_in = height,
        rows_out = series.len(),
        discarded,
        "normalized batch"
    );

    let _ = audit_checkpoint(&series, Checkpoint::Ingest, sink);
    Ok(series)
}

/// Converts one raw timestamp cell to UTC microseconds.
pub fn parse_timestamp(
    value: &RawValue,
    kind: TimestampKind,
    timezone: Tz,
) -> std::result::Result<i64, String> {
    if value.is_null() {
        return Err("missing timestamp".into());
    }

    match kind {
        TimestampKind::Local => match value {
            RawValue::Text(text) => parse_local(text, timezone),
            other => Err(format!("expected a date-time string, found '{other}'")),
        },
        TimestampKind::UnixSeconds => epoch_to_micros(value, MICROS_PER_SECOND),
        TimestampKind::UnixMillis => epoch_to_micros(value, MICROS_PER_MILLI),
    }
}

fn parse_local(text: &str, timezone: Tz) -> std::result::Result<i64, String> {
    let trimmed = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.timestamp_micros());
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, fmt) {
            return Ok(dt.timestamp_micros());
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return match timezone.from_local_datetime(&naive) {
                LocalResult::Single(dt) => Ok(dt.timestamp_micros()),
                LocalResult::Ambiguous(earlier, later) => {
                    Ok(earlier.timestamp_micros().min(later.timestamp_micros()))
                }
                LocalResult::None => Err(format!(
                    "local time '{trimmed}' does not exist in {}",
                    timezone.name()
                )),
            };
        }
    }

    Err(format!("invalid timestamp '{trimmed}'"))
}

fn epoch_to_micros(value: &RawValue, scale: f64) -> std::result::Result<i64, String> {
    let number = value
        .as_f64()
        .ok_or_else(|| format!("invalid epoch timestamp '{value}'"))?;
    let micros = (number * scale).round();
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return Err(format!("epoch timestamp '{value}' is out of range"));
    }
    Ok(micros as i64)
}
