use std::path::Path;

use anyhow::{Context, Result};
use windsync_core::audit::CollectingSink;
use windsync_core::pipelines::run_dataset;
use windsync_core::store::MemoryStore;

use crate::report::print_reports;
use crate::sources::{load_run_config, read_batch, SourceFile};

/// Runs one file through its dataset pipeline in memory and prints every quality report.
pub fn handle_audit(config_path: &Path, dataset: &str, file: &Path) -> Result<()> {
    let config = load_run_config(config_path)?;
    let settings = config
        .dataset(dataset)
        .with_context(|| format!("dataset '{dataset}' is not defined in {}", config_path.display()))?
        .resolve()
        .context("invalid run configuration")?;

    let source = SourceFile {
        label: file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string()),
        path: file.to_path_buf(),
    };
    let batch = read_batch(&source, &settings.read_options)?;

    let sink = CollectingSink::new();
    let outcome = run_dataset(&settings, std::slice::from_ref(&batch), &sink, &MemoryStore::new())
        .with_context(|| format!("dataset '{dataset}' could not process {}", file.display()))?;

    print_reports(&sink.entries());
    for failure in &outcome.failed_sources {
        println!("{}: {}", failure.source, failure.error);
    }
    if !outcome.dropped_records.is_empty() {
        println!(
            "{} record(s) dropped for an unknown discriminator value",
            outcome.dropped_records.len()
        );
    }
    Ok(())
}
