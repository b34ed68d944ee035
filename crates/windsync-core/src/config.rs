use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::Duration;
use chrono_tz::Tz;
use serde::Deserialize;
use windsync_parser::ReadOptions;

use crate::ensemble::EnsembleSettings;
use crate::error::{HarmonizeError, Result};
use crate::normalize::SchemaSettings;
use crate::resample::ResampleSettings;
use crate::series::TIMESTAMP_FIELD;
use crate::stitch::{ChannelRenames, Entity, EntitySet, StitchSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampKind {
    /// Wall-clock text in the dataset time zone, or RFC 3339 with an explicit offset.
    Local,
    UnixSeconds,
    UnixMillis,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimestampAlias {
    pub column: String,
    pub kind: TimestampKind,
}

impl TimestampAlias {
    pub fn new(column: impl Into<String>, kind: TimestampKind) -> Self {
        Self {
            column: column.into(),
            kind,
        }
    }
}

/// Which row wins when several share a grid timestamp after resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    #[default]
    KeepFirst,
    KeepLast,
}

/// What the ensemble step does when its derived channel already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerunPolicy {
    #[default]
    Overwrite,
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawLayout {
    /// One file per farm, local timestamps, one column per sensor.
    FarmSensorTable,
    /// Consecutive windows of commingled turbine rows, epoch timestamps, `WTG` discriminator.
    TurbineExport,
}

impl RawLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            RawLayout::FarmSensorTable => "farm_sensor_table",
            RawLayout::TurbineExport => "turbine_export",
        }
    }
}

impl fmt::Display for RawLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurbineChannel {
    Speed,
    Direction,
    Power,
}

impl TurbineChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurbineChannel::Speed => "speed",
            TurbineChannel::Direction => "direction",
            TurbineChannel::Power => "power",
        }
    }
}

impl fmt::Display for TurbineChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TurbineChannel {
    type Err = HarmonizeError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "speed" => Ok(TurbineChannel::Speed),
            "direction" => Ok(TurbineChannel::Direction),
            "power" => Ok(TurbineChannel::Power),
            other => Err(HarmonizeError::config(format!(
                "unknown channel rename target '{other}' (expected speed, direction or power)"
            ))),
        }
    }
}

/// Entity keys may be written as TOML integers (`key = 1`) or strings (`key = "T01"`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EntityKey {
    Integer(i64),
    Text(String),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Integer(value) => write!(f, "{value}"),
            EntityKey::Text(value) => f.write_str(value.trim()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityConfig {
    pub key: EntityKey,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelRenameConfig {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnsembleConfig {
    #[serde(default = "default_ensemble_channel")]
    pub channel: String,
    #[serde(default)]
    pub rerun: RerunPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub layout: RawLayout,
    #[serde(default)]
    pub subfolder: Option<PathBuf>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_timestamp_aliases")]
    pub timestamp_aliases: Vec<TimestampAlias>,
    #[serde(default = "default_artifact_columns")]
    pub artifact_columns: Vec<String>,
    pub resample_step_seconds: i64,
    #[serde(default)]
    pub max_gap_seconds: Option<i64>,
    #[serde(default)]
    pub duplicates: DuplicatePolicy,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub file_template: Option<String>,
    #[serde(default)]
    pub source_glob: Option<String>,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
    #[serde(default)]
    pub channel_renames: Vec<ChannelRenameConfig>,
    #[serde(default)]
    pub ensemble: Option<EnsembleConfig>,
    #[serde(default)]
    pub read_options: ReadOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub data_folder: PathBuf,
    pub output_folder: PathBuf,
    #[serde(default, rename = "dataset")]
    pub datasets: Vec<DatasetConfig>,
}

impl RunConfig {
    pub fn dataset(&self, name: &str) -> Option<&DatasetConfig> {
        self.datasets.iter().find(|dataset| dataset.name == name)
    }

    /// Resolves every dataset, failing on the first configuration error.
    pub fn resolve_all(&self) -> Result<Vec<DatasetSettings>> {
        let mut resolved = Vec::with_capacity(self.datasets.len());
        for dataset in &self.datasets {
            if resolved
                .iter()
                .any(|other: &DatasetSettings| other.name == dataset.name)
            {
                return Err(HarmonizeError::config(format!(
                    "dataset '{}' is defined more than once",
                    dataset.name
                )));
            }
            resolved.push(dataset.resolve()?);
        }
        Ok(resolved)
    }
}

/// Validated, typed settings for one dataset; the only form the engine accepts.
#[derive(Debug, Clone)]
pub struct DatasetSettings {
    pub name: String,
    pub layout: RawLayout,
    pub schema: SchemaSettings,
    pub resample: ResampleSettings,
    pub ensemble: Option<EnsembleSettings>,
    pub stitch: Option<StitchSettings>,
    pub read_options: ReadOptions,
}

impl DatasetConfig {
    pub fn resolve(&self) -> Result<DatasetSettings> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(HarmonizeError::config("dataset name must not be empty"));
        }
        let invalid = |message: String| HarmonizeError::config(format!("dataset '{name}': {message}"));

        if self.resample_step_seconds <= 0 {
            return Err(invalid(format!(
                "invalid step duration {}s; must be positive",
                self.resample_step_seconds
            )));
        }
        let max_gap = match self.max_gap_seconds {
            Some(seconds) if seconds <= 0 => {
                return Err(invalid(format!(
                    "invalid max gap {seconds}s; must be positive"
                )))
            }
            Some(seconds) => Some(
                Duration::try_seconds(seconds)
                    .ok_or_else(|| invalid(format!("max gap {seconds}s is out of range")))?,
            ),
            None => None,
        };

        if self.timestamp_aliases.is_empty() {
            return Err(invalid("at least one timestamp alias is required".into()));
        }
        for (idx, alias) in self.timestamp_aliases.iter().enumerate() {
            if self.timestamp_aliases[..idx]
                .iter()
                .any(|other| other.column == alias.column)
            {
                return Err(invalid(format!(
                    "timestamp alias '{}' is listed twice",
                    alias.column
                )));
            }
        }

        let timezone: Tz = self
            .timezone
            .parse()
            .map_err(|_| invalid(format!("unknown time zone '{}'", self.timezone)))?;

        let mut schema = SchemaSettings::new(self.timestamp_aliases.clone())
            .with_timezone(timezone)
            .with_artifact_columns(self.artifact_columns.clone());

        let step = Duration::try_seconds(self.resample_step_seconds).ok_or_else(|| {
            invalid(format!(
                "step duration {}s is out of range",
                self.resample_step_seconds
            ))
        })?;
        let resample = ResampleSettings {
            step,
            max_gap,
            duplicates: self.duplicates,
        };

        let ensemble = match &self.ensemble {
            Some(config) => {
                let channel = config.channel.trim();
                if channel.is_empty() || channel == TIMESTAMP_FIELD {
                    return Err(invalid(format!(
                        "ensemble channel name '{channel}' is not usable"
                    )));
                }
                Some(EnsembleSettings::new(channel).with_rerun(config.rerun))
            }
            None => None,
        };

        let stitch = match self.layout {
            RawLayout::FarmSensorTable => {
                if self.discriminator.is_some() || !self.entities.is_empty() {
                    return Err(invalid(
                        "discriminator and entities only apply to the turbine_export layout"
                            .into(),
                    ));
                }
                if !self.channel_renames.is_empty() {
                    return Err(invalid(
                        "channel renames only apply to the turbine_export layout".into(),
                    ));
                }
                None
            }
            RawLayout::TurbineExport => {
                let field = self
                    .discriminator
                    .as_deref()
                    .map(str::trim)
                    .filter(|field| !field.is_empty())
                    .ok_or_else(|| {
                        invalid("turbine_export layout requires a discriminator field".into())
                    })?;

                let entities = self
                    .entities
                    .iter()
                    .map(|entity| {
                        let key = entity.key.to_string();
                        let name = entity
                            .name
                            .clone()
                            .unwrap_or_else(|| format!("{field}_{key}"));
                        Entity::new(key, name)
                    })
                    .collect();
                let entities = EntitySet::new(field, entities)?;

                let mut renames = ChannelRenames::default();
                for rename in &self.channel_renames {
                    let target: TurbineChannel = rename.to.parse()?;
                    renames.insert(rename.from.trim(), target)?;
                }

                schema = schema.with_key_field(field);
                Some(StitchSettings {
                    schema: schema.clone(),
                    entities,
                    renames,
                })
            }
        };

        Ok(DatasetSettings {
            name: name.to_string(),
            layout: self.layout,
            schema,
            resample,
            ensemble,
            stitch,
            read_options: self.read_options.clone(),
        })
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_timestamp_aliases() -> Vec<TimestampAlias> {
    vec![
        TimestampAlias::new("t_local", TimestampKind::Local),
        TimestampAlias::new("t_unix", TimestampKind::UnixSeconds),
    ]
}

pub(crate) fn default_artifact_columns() -> Vec<String> {
    vec![String::new(), "Unnamed: 0".to_string()]
}

fn default_ensemble_channel() -> String {
    crate::ensemble::DEFAULT_MEAN_CHANNEL.to_string()
}
