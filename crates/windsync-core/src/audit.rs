use std::cell::RefCell;
use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{HarmonizeError, Result};
use crate::series::CanonicalSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    Ingest,
    Resampled,
}

impl Checkpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Checkpoint::Ingest => "ingest",
            Checkpoint::Resampled => "resampled",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Missing-value summary of one series. Percentages are in `0.0..=100.0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub entity: String,
    pub rows: usize,
    pub columns: usize,
    pub rows_with_missing: usize,
    pub rows_with_missing_pct: f64,
    pub columns_with_missing: usize,
    pub columns_with_missing_pct: f64,
    pub rows_all_missing: usize,
    pub rows_all_missing_pct: f64,
}

/// Counts missing values over the non-timestamp fields (channels and, while present, the
/// discriminator). Never touches the series. Zero rows or zero columns cannot produce
/// percentages and are reported as `HarmonizeError::Audit`.
pub fn audit(series: &CanonicalSeries) -> Result<QualityReport> {
    let rows = series.len();
    let key_values = series.key().map(|key| &key.values);
    let columns = series.channels().len() + usize::from(key_values.is_some());

    if rows == 0 {
        return Err(HarmonizeError::Audit {
            entity: series.entity().to_string(),
            message: "series has no rows; missing-value percentages are undefined".into(),
        });
    }
    if columns == 0 {
        return Err(HarmonizeError::Audit {
            entity: series.entity().to_string(),
            message: "series has no value columns; missing-value percentages are undefined"
                .into(),
        });
    }

    let mut missing_per_row = vec![0usize; rows];
    let mut columns_with_missing = 0;

    for channel in series.channels() {
        let mut column_has_missing = false;
        for (row, value) in channel.values.iter().enumerate() {
            if value.is_none() {
                missing_per_row[row] += 1;
                column_has_missing = true;
            }
        }
        columns_with_missing += usize::from(column_has_missing);
    }

    if let Some(values) = key_values {
        let mut column_has_missing = false;
        for (row, value) in values.iter().enumerate() {
            if value.is_none() {
                missing_per_row[row] += 1;
                column_has_missing = true;
            }
        }
        columns_with_missing += usize::from(column_has_missing);
    }

    let rows_with_missing = missing_per_row.iter().filter(|&&n| n > 0).count();
    let rows_all_missing = missing_per_row.iter().filter(|&&n| n == columns).count();

    Ok(QualityReport {
        entity: series.entity().to_string(),
        rows,
        columns,
        rows_with_missing,
        rows_with_missing_pct: percentage(rows_with_missing, rows),
        columns_with_missing,
        columns_with_missing_pct: percentage(columns_with_missing, columns),
        rows_all_missing,
        rows_all_missing_pct: percentage(rows_all_missing, rows),
    })
}

fn percentage(part: usize, whole: usize) -> f64 {
    part as f64 / whole as f64 * 100.0
}

/// Reporting collaborator for quality checkpoints.
pub trait QualitySink {
    fn record(&self, checkpoint: Checkpoint, outcome: &Result<QualityReport>);
}

/// Audits `series` and forwards the outcome to `sink`; the series itself is untouched.
pub fn audit_checkpoint(
    series: &CanonicalSeries,
    checkpoint: Checkpoint,
    sink: &dyn QualitySink,
) -> Result<QualityReport> {
    let outcome = audit(series);
    sink.record(checkpoint, &outcome);
    outcome
}

/// Emits each report as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl QualitySink for TracingSink {
    fn record(&self, checkpoint: Checkpoint, outcome: &Result<QualityReport>) {
        match outcome {
            Ok(report) => info!(
                checkpoint = %checkpoint,
                entity = %report.entity,
                rows = report.rows,
                columns = report.columns,
                rows_with_missing = report.rows_with_missing,
                rows_with_missing_pct = report.rows_with_missing_pct,
                columns_with_missing = report.columns_with_missing,
                columns_with_missing_pct = report.columns_with_missing_pct,
                rows_all_missing = report.rows_all_missing,
                rows_all_missing_pct = report.rows_all_missing_pct,
                "quality report"
            ),
            Err(err) => warn!(checkpoint = %checkpoint, error = %err, "quality report unavailable"),
        }
    }
}

/// Keeps every outcome in memory, in arrival order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    entries: RefCell<Vec<(Checkpoint, std::result::Result<QualityReport, String>)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Checkpoint, std::result::Result<QualityReport, String>)> {
        self.entries.borrow().clone()
    }

    pub fn reports(&self, checkpoint: Checkpoint) -> Vec<QualityReport> {
        self.entries
            .borrow()
            .iter()
            .filter(|(cp, _)| *cp == checkpoint)
            .filter_map(|(_, outcome)| outcome.as_ref().ok().cloned())
            .collect()
    }
}

impl QualitySink for CollectingSink {
    fn record(&self, checkpoint: Checkpoint, outcome: &Result<QualityReport>) {
        let stored = match outcome {
            Ok(report) => Ok(report.clone()),
            Err(err) => Err(err.to_string()),
        };
        self.entries.borrow_mut().push((checkpoint, stored));
    }
}
