use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};
use windsync_core::audit::TracingSink;
use windsync_core::config::DatasetSettings;
use windsync_core::pipelines::run_dataset;
use windsync_core::store::{ArtifactStore, MemoryStore, ParquetDirStore};
use windsync_parser::RawBatch;

use crate::report::{print_run, DatasetSummary, SourceProblem};
use crate::sources::{discover, load_run_config, read_batch};

pub fn handle_run(config_path: &Path, only: Option<&str>, dry_run: bool) -> Result<()> {
    let config = load_run_config(config_path)?;
    // Any configuration error stops the run before a single file is read.
    let resolved = config.resolve_all().context("invalid run configuration")?;

    let selected: Vec<&DatasetSettings> = match only {
        Some(name) => match resolved.iter().find(|dataset| dataset.name == name) {
            Some(dataset) => vec![dataset],
            None => bail!("dataset '{name}' is not defined in {}", config_path.display()),
        },
        None => resolved.iter().collect(),
    };
    if selected.is_empty() {
        bail!("{} defines no datasets", config_path.display());
    }

    let parquet = ParquetDirStore::new(&config.output_folder);
    let memory = MemoryStore::new();
    let store: &dyn ArtifactStore = if dry_run { &memory } else { &parquet };
    info!(output = %parquet.root().display(), dry_run, "artifact store ready");

    let mut plans = Vec::with_capacity(selected.len());
    for settings in selected {
        let dataset = config
            .dataset(&settings.name)
            .with_context(|| format!("dataset '{}' vanished from the configuration", settings.name))?;
        let sources = discover(&config, dataset)?;
        plans.push((settings, sources));
    }

    let mut summaries = Vec::new();
    let mut failed_datasets = 0usize;
    for (settings, sources) in plans {
        info!(dataset = %settings.name, sources = sources.len(), "harmonizing dataset");

        let mut batches: Vec<RawBatch> = Vec::with_capacity(sources.len());
        let mut unreadable = Vec::new();
        for source in &sources {
            match read_batch(source, &settings.read_options) {
                Ok(batch) => batches.push(batch),
                Err(err) => {
                    warn!(dataset = %settings.name, source = %source.label, error = %format!("{err:#}"), "source skipped");
                    unreadable.push(SourceProblem {
                        source: source.label.clone(),
                        reason: format!("{err:#}"),
                    });
                }
            }
        }

        match run_dataset(settings, &batches, &TracingSink, store) {
            Ok(outcome) => summaries.push(DatasetSummary {
                outcome,
                unreadable,
            }),
            Err(err) if err.is_fatal_for_run() => {
                return Err(err).with_context(|| format!("dataset '{}' aborted the run", settings.name));
            }
            Err(err) => {
                error!(dataset = %settings.name, error = %err, "dataset failed");
                failed_datasets += 1;
            }
        }
    }

    print_run(&summaries, dry_run);

    if failed_datasets > 0 {
        bail!("{failed_datasets} dataset(s) could not be harmonized");
    }
    Ok(())
}
