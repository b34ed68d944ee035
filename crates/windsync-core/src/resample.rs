use chrono::Duration;
use tracing::debug;

use crate::config::DuplicatePolicy;
use crate::error::{HarmonizeError, Result};
use crate::series::{CanonicalSeries, Channel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResampleSettings {
    pub step: Duration,
    /// Holes between observations further apart than this stay undefined.
    pub max_gap: Option<Duration>,
    pub duplicates: DuplicatePolicy,
}

impl ResampleSettings {
    pub fn new(step: Duration) -> Self {
        Self {
            step,
            max_gap: None,
            duplicates: DuplicatePolicy::default(),
        }
    }

    pub fn with_max_gap(mut self, max_gap: Duration) -> Self {
        self.max_gap = Some(max_gap);
        self
    }

    pub fn with_duplicates(mut self, duplicates: DuplicatePolicy) -> Self {
        self.duplicates = duplicates;
        self
    }

    fn step_micros(&self) -> Result<i64> {
        positive_micros(self.step, "step duration")
    }

    fn max_gap_micros(&self) -> Result<Option<i64>> {
        self.max_gap
            .map(|gap| positive_micros(gap, "max gap"))
            .transpose()
    }
}

fn positive_micros(duration: Duration, what: &str) -> Result<i64> {
    match duration.num_microseconds() {
        Some(micros) if micros > 0 => Ok(micros),
        _ => Err(HarmonizeError::config(format!(
            "invalid {what} {duration}; must be positive"
        ))),
    }
}

/// Projects `series` onto the grid `first + k * step` (k >= 0, up to the last observation).
///
/// Grid points are merged with the observed timestamps, holes strictly inside the
/// observed range of each channel are filled by linear interpolation in elapsed time,
/// and the result is cut back to the grid. Where several rows share a grid timestamp the
/// duplicate policy picks one. Nothing is extrapolated past the first or last defined
/// value of a channel.
pub fn resample(series: &CanonicalSeries, settings: &ResampleSettings) -> Result<CanonicalSeries> {
    let step = settings.step_micros()?;
    let max_gap = settings.max_gap_micros()?;

    if let Some(key) = series.key() {
        return Err(HarmonizeError::config(format!(
            "series '{}' still carries discriminator '{}'; stitch it before resampling",
            series.entity(),
            key.field
        )));
    }

    if series.is_empty() {
        let names: Vec<String> = series.channels().iter().map(|c| c.name.clone()).collect();
        return Ok(CanonicalSeries::empty(series.entity(), &names));
    }

    let timestamps = series.timestamps();
    let mut order: Vec<usize> = (0..series.len()).collect();
    order.sort_by_key(|&row| timestamps[row]);

    let first = timestamps[order[0]];
    let last = timestamps[order[order.len() - 1]];
    let span = i128::from(last) - i128::from(first);
    let grid_len = usize::try_from(span / i128::from(step) + 1).map_err(|_| {
        HarmonizeError::config(format!(
            "series '{}' spans too many steps of {}µs",
            series.entity(),
            step
        ))
    })?;
    let grid: Vec<i64> = (0..grid_len).map(|k| first + k as i64 * step).collect();

    // Observed rows in time order, with grid points that were not observed slotted in.
    let mut combined: Vec<(i64, Option<usize>)> = Vec::with_capacity(order.len() + grid_len);
    let mut k = 0;
    for &row in &order {
        let ts = timestamps[row];
        while k < grid_len && grid[k] < ts {
            combined.push((grid[k], None));
            k += 1;
        }
        if k < grid_len && grid[k] == ts {
            k += 1;
        }
        combined.push((ts, Some(row)));
    }
    combined.extend(grid[k..].iter().map(|&ts| (ts, None)));

    let combined_times: Vec<i64> = combined.iter().map(|(ts, _)| *ts).collect();

    let mut picks = Vec::with_capacity(grid_len);
    let mut idx = 0;
    for &point in &grid {
        while combined_times[idx] < point {
            idx += 1;
        }
        let start = idx;
        while idx < combined_times.len() && combined_times[idx] == point {
            idx += 1;
        }
        picks.push(match settings.duplicates {
            DuplicatePolicy::KeepFirst => start,
            DuplicatePolicy::KeepLast => idx - 1,
        });
    }

    let channels = series
        .channels()
        .iter()
        .map(|channel| {
            let raw: Vec<Option<f64>> = combined
                .iter()
                .map(|(_, row)| row.and_then(|r| channel.values[r]))
                .collect();
            let filled = interpolate_linear(&combined_times, &raw, max_gap);
            Channel::new(
                channel.name.clone(),
                picks.iter().map(|&pick| filled[pick]).collect(),
            )
        })
        .collect();

    debug!(
        entity = series.entity(),
        rows_in = series.len(),
        rows_out = grid_len,
        step_us = step,
        "resampled series"
    );

    CanonicalSeries::new(series.entity(), grid, channels)
}

/// Fills undefined values lying between two defined ones, weighting by elapsed time.
/// Leading and trailing gaps are left alone, as are gaps wider than `max_gap`.
pub fn interpolate_linear(
    times: &[i64],
    values: &[Option<f64>],
    max_gap: Option<i64>,
) -> Vec<Option<f64>> {
    let mut filled = values.to_vec();
    let mut previous: Option<usize> = None;

    for (idx, value) in values.iter().enumerate() {
        let Some(v1) = *value else {
            continue;
        };
        if let Some(p) = previous {
            if idx > p + 1 {
                let (t0, t1) = (times[p], times[idx]);
                let v0 = values[p].unwrap_or(v1);
                let width = t1 - t0;
                if max_gap.map_or(true, |limit| width <= limit) {
                    for hole in p + 1..idx {
                        filled[hole] = Some(if width == 0 {
                            v0
                        } else {
                            v0 + (v1 - v0) * (times[hole] - t0) as f64 / width as f64
                        });
                    }
                }
            }
        }
        previous = Some(idx);
    }

    filled
}
