use once_cell::sync::Lazy;
use tracing::{info, warn};
use windsync_parser::RawBatch;

use crate::audit::{audit_checkpoint, Checkpoint, QualityReport, QualitySink};
use crate::config::{DatasetSettings, RawLayout};
use crate::ensemble::append_mean;
use crate::error::{HarmonizeError, Result};
use crate::normalize::normalize_batch;
use crate::resample::resample;
use crate::series::CanonicalSeries;
use crate::stitch::{stitch_batches, DroppedRecord, SourceFailure};
use crate::store::ArtifactStore;

#[derive(Debug, Clone)]
pub struct EntityOutcome {
    pub entity: String,
    pub artifact: String,
    pub rows_in: usize,
    pub rows_out: usize,
    pub channels: Vec<String>,
    /// `None` when the resampled series could not be audited (for example, it is empty).
    pub report: Option<QualityReport>,
}

#[derive(Debug)]
pub struct DatasetOutcome {
    pub dataset: String,
    pub pipeline: &'static str,
    pub entities: Vec<EntityOutcome>,
    pub failed_sources: Vec<SourceFailure>,
    pub dropped_records: Vec<DroppedRecord>,
}

impl DatasetOutcome {
    fn new(dataset: &str, pipeline: &'static str) -> Self {
        Self {
            dataset: dataset.to_string(),
            pipeline,
            entities: Vec::new(),
            failed_sources: Vec::new(),
            dropped_records: Vec::new(),
        }
    }

    /// Records a source or entity that could not be harmonized; its siblings carry on.
    fn record_failure(&mut self, source: &str, error: HarmonizeError) {
        warn!(
            dataset = %self.dataset,
            source,
            error = %error,
            "source skipped"
        );
        self.failed_sources.push(SourceFailure {
            source: source.to_string(),
            error,
        });
    }

    pub fn rows_out(&self) -> usize {
        self.entities.iter().map(|entity| entity.rows_out).sum()
    }
}

pub fn artifact_name(dataset: &str, entity: &str) -> String {
    format!("{dataset}_{entity}")
}

pub trait HarmonizationPipeline: Send + Sync {
    fn code_identifier(&self) -> &'static str;
    fn version(&self) -> &'static str;
    fn layout(&self) -> RawLayout;
    fn run(
        &self,
        settings: &DatasetSettings,
        batches: &[RawBatch],
        sink: &dyn QualitySink,
        store: &dyn ArtifactStore,
    ) -> Result<DatasetOutcome>;
}

static PIPELINE_IMPLEMENTATIONS: Lazy<Vec<&'static dyn HarmonizationPipeline>> = Lazy::new(|| {
    vec![
        &FarmSensorPipeline as &dyn HarmonizationPipeline,
        &TurbineStitchPipeline as &dyn HarmonizationPipeline,
    ]
});

pub fn all_pipelines() -> &'static [&'static dyn HarmonizationPipeline] {
    PIPELINE_IMPLEMENTATIONS.as_slice()
}

pub fn pipeline_for(layout: RawLayout) -> Option<&'static dyn HarmonizationPipeline> {
    all_pipelines()
        .iter()
        .copied()
        .find(|pipeline| pipeline.layout() == layout)
}

/// Looks up the pipeline for the dataset layout and runs it.
pub fn run_dataset(
    settings: &DatasetSettings,
    batches: &[RawBatch],
    sink: &dyn QualitySink,
    store: &dyn ArtifactStore,
) -> Result<DatasetOutcome> {
    let pipeline = pipeline_for(settings.layout).ok_or_else(|| {
        HarmonizeError::config(format!("no pipeline handles layout '{}'", settings.layout))
    })?;
    pipeline.run(settings, batches, sink, store)
}

fn ensure_layout(pipeline: &dyn HarmonizationPipeline, settings: &DatasetSettings) -> Result<()> {
    if settings.layout != pipeline.layout() {
        return Err(HarmonizeError::config(format!(
            "pipeline {} expects layout '{}' but dataset '{}' is '{}'",
            pipeline.code_identifier(),
            pipeline.layout(),
            settings.name,
            settings.layout
        )));
    }
    Ok(())
}

/// Resample, audit, derive the ensemble channel and store one entity's series.
fn finish_entity(
    settings: &DatasetSettings,
    series: &CanonicalSeries,
    sink: &dyn QualitySink,
    store: &dyn ArtifactStore,
) -> Result<EntityOutcome> {
    let resampled = resample(series, &settings.resample)?;
    let report = audit_checkpoint(&resampled, Checkpoint::Resampled, sink).ok();

    let finished = match &settings.ensemble {
        Some(ensemble) => append_mean(&resampled, ensemble)?,
        None => resampled,
    };

    let artifact = artifact_name(&settings.name, finished.entity());
    store.store(&artifact, &finished)?;

    Ok(EntityOutcome {
        entity: finished.entity().to_string(),
        artifact,
        rows_in: series.len(),
        rows_out: finished.len(),
        channels: finished
            .channel_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        report,
    })
}

/// One farm file per batch; each becomes its own entity named after the source.
pub struct FarmSensorPipeline;

impl HarmonizationPipeline for FarmSensorPipeline {
    fn code_identifier(&self) -> &'static str {
        "farm_sensor_v1"
    }

    fn version(&self) -> &'static str {
        "0.1.0"
    }

    fn layout(&self) -> RawLayout {
        RawLayout::FarmSensorTable
    }

    fn run(
        &self,
        settings: &DatasetSettings,
        batches: &[RawBatch],
        sink: &dyn QualitySink,
        store: &dyn ArtifactStore,
    ) -> Result<DatasetOutcome> {
        ensure_layout(self, settings)?;
        let mut outcome = DatasetOutcome::new(&settings.name, self.code_identifier());

        for batch in batches {
            let series = match normalize_batch(batch, &settings.schema, sink) {
                Ok(series) => series,
                Err(error) => {
                    outcome.record_failure(batch.source(), error);
                    continue;
                }
            };
            match finish_entity(settings, &series, sink, store) {
                Ok(entity) => outcome.entities.push(entity),
                Err(error) => outcome.record_failure(batch.source(), error),
            }
        }

        info!(
            dataset = %settings.name,
            pipeline = self.code_identifier(),
            entities = outcome.entities.len(),
            failed = outcome.failed_sources.len(),
            rows = outcome.rows_out(),
            "dataset harmonized"
        );
        Ok(outcome)
    }
}

/// Commingled turbine windows: stitch every batch, then finish each configured entity.
pub struct TurbineStitchPipeline;

impl HarmonizationPipeline for TurbineStitchPipeline {
    fn code_identifier(&self) -> &'static str {
        "turbine_stitch_v1"
    }

    fn version(&self) -> &'static str {
        "0.1.0"
    }

    fn layout(&self) -> RawLayout {
        RawLayout::TurbineExport
    }

    fn run(
        &self,
        settings: &DatasetSettings,
        batches: &[RawBatch],
        sink: &dyn QualitySink,
        store: &dyn ArtifactStore,
    ) -> Result<DatasetOutcome> {
        ensure_layout(self, settings)?;
        let stitch = settings.stitch.as_ref().ok_or_else(|| {
            HarmonizeError::config(format!(
                "dataset '{}' has no discriminator settings",
                settings.name
            ))
        })?;

        let stitched = stitch_batches(batches, stitch, sink)?;
        let mut outcome = DatasetOutcome::new(&settings.name, self.code_identifier());
        outcome.failed_sources = stitched.failed_sources;
        outcome.dropped_records = stitched.dropped_records;

        for series in &stitched.series {
            match finish_entity(settings, series, sink, store) {
                Ok(entity) => outcome.entities.push(entity),
                Err(error) => outcome.record_failure(series.entity(), error),
            }
        }

        info!(
            dataset = %settings.name,
            pipeline = self.code_identifier(),
            entities = outcome.entities.len(),
            failed = outcome.failed_sources.len(),
            dropped = outcome.dropped_records.len(),
            rows = outcome.rows_out(),
            "dataset harmonized"
        );
        Ok(outcome)
    }
}
