use polars::prelude::*;

use crate::error::{HarmonizeError, Result};

/// Canonical name of the designated timestamp field.
pub const TIMESTAMP_FIELD: &str = "timestamp";

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl Channel {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Discriminator values carried by a normalized multi-entity batch until it is stitched.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyColumn {
    pub field: String,
    pub values: Vec<Option<String>>,
}

/// Time-ordered records for one entity: UTC microsecond timestamps plus named numeric
/// channels of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalSeries {
    entity: String,
    timestamps: Vec<i64>,
    channels: Vec<Channel>,
    key: Option<KeyColumn>,
}

impl CanonicalSeries {
    pub fn new(
        entity: impl Into<String>,
        timestamps: Vec<i64>,
        channels: Vec<Channel>,
    ) -> Result<Self> {
        Self::with_key(entity, timestamps, channels, None)
    }

    pub fn with_key(
        entity: impl Into<String>,
        timestamps: Vec<i64>,
        channels: Vec<Channel>,
        key: Option<KeyColumn>,
    ) -> Result<Self> {
        let entity = entity.into();
        let rows = timestamps.len();
        for (idx, channel) in channels.iter().enumerate() {
            if channels[..idx].iter().any(|other| other.name == channel.name) {
                return Err(HarmonizeError::config(format!(
                    "series '{entity}': channel '{}' appears more than once",
                    channel.name
                )));
            }
            if channel.values.len() != rows {
                return Err(HarmonizeError::config(format!(
                    "series '{entity}': channel '{}' has {} values, expected {rows}",
                    channel.name,
                    channel.values.len()
                )));
            }
            if channel.name == TIMESTAMP_FIELD {
                return Err(HarmonizeError::config(format!(
                    "series '{entity}': channel name '{TIMESTAMP_FIELD}' is reserved"
                )));
            }
        }
        if let Some(key) = &key {
            if key.values.len() != rows {
                return Err(HarmonizeError::config(format!(
                    "series '{entity}': key column '{}' has {} values, expected {rows}",
                    key.field,
                    key.values.len()
                )));
            }
        }

        Ok(Self {
            entity,
            timestamps,
            channels,
            key,
        })
    }

    /// A series with the given channel names and no rows.
    pub fn empty(entity: impl Into<String>, channel_names: &[String]) -> Self {
        Self {
            entity: entity.into(),
            timestamps: Vec::new(),
            channels: channel_names
                .iter()
                .map(|name| Channel::new(name.clone(), Vec::new()))
                .collect(),
            key: None,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|channel| channel.name == name)
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn key(&self) -> Option<&KeyColumn> {
        self.key.as_ref()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<i64> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.timestamps.last().copied()
    }

    pub fn is_strictly_increasing(&self) -> bool {
        self.timestamps.windows(2).all(|pair| pair[0] < pair[1])
    }

    pub fn into_parts(self) -> (String, Vec<i64>, Vec<Channel>, Option<KeyColumn>) {
        (self.entity, self.timestamps, self.channels, self.key)
    }

    /// Polars view of the series: a UTC `timestamp` column followed by one `Float64`
    /// column per channel. The key column, if still present, is emitted as text.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let ts_series = Series::new(TIMESTAMP_FIELD.into(), self.timestamps.clone()).cast(
            &DataType::Datetime(TimeUnit::Microseconds, Some(polars::prelude::TimeZone::UTC)),
        )?;

        let mut columns: Vec<Column> = Vec::with_capacity(self.channels.len() + 2);
        columns.push(ts_series.into());

        if let Some(key) = &self.key {
            let text: Vec<Option<&str>> = key.values.iter().map(|v| v.as_deref()).collect();
            columns.push(Series::new(key.field.as_str().into(), text).into());
        }

        for channel in &self.channels {
            columns.push(Series::new(channel.name.as_str().into(), channel.values.clone()).into());
        }

        Ok(DataFrame::new(columns)?)
    }
}
