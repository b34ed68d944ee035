use tracing::{debug, info};

use crate::config::RerunPolicy;
use crate::error::{HarmonizeError, Result};
use crate::series::{CanonicalSeries, Channel, TIMESTAMP_FIELD};

pub const DEFAULT_MEAN_CHANNEL: &str = "Mean";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsembleSettings {
    pub channel: String,
    pub rerun: RerunPolicy,
}

impl EnsembleSettings {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            rerun: RerunPolicy::default(),
        }
    }

    pub fn with_rerun(mut self, rerun: RerunPolicy) -> Self {
        self.rerun = rerun;
        self
    }
}

impl Default for EnsembleSettings {
    fn default() -> Self {
        Self::new(DEFAULT_MEAN_CHANNEL)
    }
}

/// Returns `series` with an extra channel holding the row-wise mean of every other channel.
///
/// Undefined inputs are skipped; a row with no defined input gets an undefined mean. If
/// the derived channel is already present it is either recomputed in place from the
/// remaining channels (`Overwrite`) or rejected (`Strict`). Fewer than two source channels
/// is a configuration error.
pub fn append_mean(series: &CanonicalSeries, settings: &EnsembleSettings) -> Result<CanonicalSeries> {
    let target = settings.channel.as_str();
    if target.is_empty() || target == TIMESTAMP_FIELD {
        return Err(HarmonizeError::config(format!(
            "ensemble channel name '{target}' is not usable"
        )));
    }

    let existing = series.channels().iter().position(|c| c.name == target);
    if existing.is_some() && settings.rerun == RerunPolicy::Strict {
        return Err(HarmonizeError::config(format!(
            "series '{}' already has channel '{target}'",
            series.entity()
        )));
    }

    let sources: Vec<&Channel> = series
        .channels()
        .iter()
        .filter(|c| c.name != target)
        .collect();
    if sources.len() < 2 {
        return Err(HarmonizeError::config(format!(
            "series '{}' has {} source channel(s); an ensemble mean needs at least 2",
            series.entity(),
            sources.len()
        )));
    }

    let means: Vec<Option<f64>> = (0..series.len())
        .map(|row| {
            let (sum, count) = sources
                .iter()
                .filter_map(|c| c.values[row])
                .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
            (count > 0).then(|| sum / count as f64)
        })
        .collect();

    let mut channels = series.channels().to_vec();
    match existing {
        Some(idx) => {
            debug!(entity = series.entity(), channel = target, "recomputing ensemble channel");
            channels[idx].values = means;
        }
        None => channels.push(Channel::new(target, means)),
    }

    info!(
        entity = series.entity(),
        channel = target,
        sources = sources.len(),
        "ensemble mean appended"
    );

    CanonicalSeries::with_key(
        series.entity(),
        series.timestamps().to_vec(),
        channels,
        series.key().cloned(),
    )
}
