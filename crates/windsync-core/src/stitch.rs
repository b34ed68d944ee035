use tracing::{info, warn};
use windsync_parser::RawBatch;

use crate::audit::QualitySink;
use crate::config::TurbineChannel;
use crate::error::{HarmonizeError, Result};
use crate::normalize::{normalize_batch, SchemaSettings};
use crate::series::{CanonicalSeries, Channel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Discriminator value as rendered from the raw cell (`1.0` reads as `"1"`).
    pub key: String,
    pub name: String,
}

impl Entity {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
        }
    }
}

/// The fixed set of entities a discriminator field may name. Entities are addressed by
/// ordinal, so stitched output always holds one series per entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySet {
    field: String,
    entities: Vec<Entity>,
}

impl EntitySet {
    pub fn new(field: impl Into<String>, entities: Vec<Entity>) -> Result<Self> {
        let field = field.into();
        if entities.is_empty() {
            return Err(HarmonizeError::config(format!(
                "entity set for discriminator '{field}' is empty"
            )));
        }
        for (idx, entity) in entities.iter().enumerate() {
            if entities[..idx].iter().any(|other| other.key == entity.key) {
                return Err(HarmonizeError::config(format!(
                    "entity key '{}' is listed twice for discriminator '{field}'",
                    entity.key
                )));
            }
            if entities[..idx].iter().any(|other| other.name == entity.name) {
                return Err(HarmonizeError::config(format!(
                    "entity name '{}' is used twice for discriminator '{field}'",
                    entity.name
                )));
            }
        }
        Ok(Self { field, entities })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn ordinal(&self, key: &str) -> Option<usize> {
        self.entities.iter().position(|entity| entity.key == key)
    }
}

/// Positional raw column label to canonical turbine channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelRenames {
    pairs: Vec<(String, TurbineChannel)>,
}

impl ChannelRenames {
    /// The usual SCADA export layout: columns `0`, `1`, `2` hold speed, direction, power.
    pub fn positional() -> Self {
        Self {
            pairs: vec![
                ("0".to_string(), TurbineChannel::Speed),
                ("1".to_string(), TurbineChannel::Direction),
                ("2".to_string(), TurbineChannel::Power),
            ],
        }
    }

    pub fn insert(&mut self, from: impl Into<String>, to: TurbineChannel) -> Result<()> {
        let from = from.into();
        if self.pairs.iter().any(|(existing, _)| *existing == from) {
            return Err(HarmonizeError::config(format!(
                "column '{from}' is renamed twice"
            )));
        }
        if self.pairs.iter().any(|(_, target)| *target == to) {
            return Err(HarmonizeError::config(format!(
                "channel '{to}' is the target of more than one rename"
            )));
        }
        self.pairs.push((from, to));
        Ok(())
    }

    pub fn target(&self, from: &str) -> Option<TurbineChannel> {
        self.pairs
            .iter()
            .find(|(source, _)| source == from)
            .map(|(_, target)| *target)
    }

    pub fn targets(&self) -> impl Iterator<Item = TurbineChannel> + '_ {
        self.pairs.iter().map(|(_, target)| *target)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StitchSettings {
    pub schema: SchemaSettings,
    pub entities: EntitySet,
    pub renames: ChannelRenames,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroppedRecord {
    pub source: String,
    /// Row position after normalization (time-sorted).
    pub row: usize,
    pub timestamp: i64,
    pub key: Option<String>,
}

#[derive(Debug)]
pub struct SourceFailure {
    pub source: String,
    pub error: HarmonizeError,
}

#[derive(Debug)]
pub struct StitchOutcome {
    /// One series per entity, in entity-set order.
    pub series: Vec<CanonicalSeries>,
    pub dropped_records: Vec<DroppedRecord>,
    pub failed_sources: Vec<SourceFailure>,
}

impl StitchOutcome {
    pub fn total_rows(&self) -> usize {
        self.series.iter().map(CanonicalSeries::len).sum()
    }
}

#[derive(Default)]
struct EntityAccumulator {
    timestamps: Vec<i64>,
    slots: Vec<Vec<Option<f64>>>,
}

struct ChannelLayout {
    names: Vec<String>,
}

impl ChannelLayout {
    fn slot_for(&mut self, name: &str, arena: &mut [EntityAccumulator]) -> usize {
        if let Some(slot) = self.names.iter().position(|existing| existing == name) {
            return slot;
        }
        self.names.push(name.to_string());
        for acc in arena.iter_mut() {
            acc.slots.push(vec![None; acc.timestamps.len()]);
        }
        self.names.len() - 1
    }
}

/// Splits commingled batches by discriminator and concatenates each entity's rows in
/// batch order.
///
/// Each batch is normalized first, so rows are time-sorted within a batch; batches are
/// not re-sorted against each other and overlapping windows may leave duplicate
/// timestamps for the resampler to resolve. Rows whose key is missing or outside the
/// entity set are dropped and reported. A batch that fails normalization is recorded in
/// `failed_sources` and does not affect the others.
pub fn stitch_batches(
    batches: &[RawBatch],
    settings: &StitchSettings,
    sink: &dyn QualitySink,
) -> Result<StitchOutcome> {
    let entities = &settings.entities;
    let schema = settings
        .schema
        .clone()
        .with_key_field(entities.field().to_string());

    let mut arena: Vec<EntityAccumulator> = (0..entities.len())
        .map(|_| EntityAccumulator::default())
        .collect();
    let mut layout = ChannelLayout { names: Vec::new() };
    for target in settings.renames.targets() {
        layout.slot_for(target.as_str(), &mut arena);
    }

    let mut dropped_records = Vec::new();
    let mut failed_sources = Vec::new();

    for batch in batches {
        let source = batch.source();
        let normalized = match normalize_batch(batch, &schema, sink) {
            Ok(series) => series,
            Err(error) => {
                warn!(source, error = %error, "skipping source that failed normalization");
                failed_sources.push(SourceFailure {
                    source: source.to_string(),
                    error,
                });
                continue;
            }
        };

        let (_, timestamps, channels, key) = normalized.into_parts();
        let Some(key) = key else {
            failed_sources.push(SourceFailure {
                source: source.to_string(),
                error: HarmonizeError::schema(
                    source,
                    format!("discriminator column '{}' is missing", entities.field()),
                ),
            });
            continue;
        };

        let canonical: Vec<String> = channels
            .iter()
            .map(|channel| {
                settings
                    .renames
                    .target(&channel.name)
                    .map(|target| target.as_str().to_string())
                    .unwrap_or_else(|| channel.name.clone())
            })
            .collect();
        let collision = canonical.iter().enumerate().find_map(|(idx, name)| {
            canonical[..idx]
                .iter()
                .position(|other| other == name)
                .map(|first| {
                    format!(
                        "columns '{}' and '{}' both map to channel '{name}'",
                        channels[first].name, channels[idx].name
                    )
                })
        });
        if let Some(message) = collision {
            let error = HarmonizeError::schema(source, message);
            warn!(source, error = %error, "skipping source with conflicting channel names");
            failed_sources.push(SourceFailure {
                source: source.to_string(),
                error,
            });
            continue;
        }
        let slot_columns: Vec<(usize, &Channel)> = canonical
            .iter()
            .zip(&channels)
            .map(|(name, channel)| (layout.slot_for(name, &mut arena), channel))
            .collect();

        let mut partitions: Vec<Vec<usize>> = vec![Vec::new(); entities.len()];
        let mut dropped_here = 0usize;
        for (row, value) in key.values.iter().enumerate() {
            match value.as_deref().and_then(|k| entities.ordinal(k)) {
                Some(ordinal) => partitions[ordinal].push(row),
                None => {
                    let error = HarmonizeError::Stitch {
                        source_id: source.to_string(),
                        message: format!(
                            "row {row}: {} value {:?} is not a known entity",
                            entities.field(),
                            value.as_deref().unwrap_or("<missing>")
                        ),
                    };
                    warn!(source, error = %error, "dropping record");
                    dropped_records.push(DroppedRecord {
                        source: source.to_string(),
                        row,
                        timestamp: timestamps[row],
                        key: value.clone(),
                    });
                    dropped_here += 1;
                }
            }
        }

        for (acc, rows) in arena.iter_mut().zip(&partitions) {
            for &row in rows {
                acc.timestamps.push(timestamps[row]);
            }
            for (slot, values) in acc.slots.iter_mut().enumerate() {
                match slot_columns.iter().find(|(s, _)| *s == slot) {
                    Some((_, channel)) => values.extend(rows.iter().map(|&row| channel.values[row])),
                    None => values.extend(std::iter::repeat(None).take(rows.len())),
                }
            }
        }

        info!(
            source,
            rows = timestamps.len(),
            dropped = dropped_here,
            "stitched batch"
        );
    }

    let series = arena
        .into_iter()
        .zip(entities.entities())
        .map(|(acc, entity)| {
            let channels = layout
                .names
                .iter()
                .cloned()
                .zip(acc.slots)
                .map(|(name, values)| Channel::new(name, values))
                .collect();
            CanonicalSeries::new(entity.name.clone(), acc.timestamps, channels)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(StitchOutcome {
        series,
        dropped_records,
        failed_sources,
    })
}
