use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use windsync_core::pipelines::pipeline_for;

use crate::sources::{discover, load_run_config};

/// Resolves every dataset and lists its sources, flagging files that are not there.
pub fn handle_check(config_path: &Path) -> Result<()> {
    let config = load_run_config(config_path)?;
    let resolved = config.resolve_all().context("invalid run configuration")?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Dataset", "Layout", "Pipeline", "Step", "Ensemble", "Source", "Status",
    ]);

    let mut missing = 0usize;
    for settings in &resolved {
        let dataset = config
            .dataset(&settings.name)
            .with_context(|| format!("dataset '{}' vanished from the configuration", settings.name))?;
        let pipeline = pipeline_for(settings.layout)
            .map(|p| format!("{} {}", p.code_identifier(), p.version()))
            .unwrap_or_else(|| "none".to_string());
        let ensemble = settings
            .ensemble
            .as_ref()
            .map(|e| e.channel.clone())
            .unwrap_or_else(|| "-".to_string());

        let sources = discover(&config, dataset)?;
        if sources.is_empty() {
            table.add_row(vec![
                settings.name.clone(),
                settings.layout.to_string(),
                pipeline.clone(),
                settings.resample.step.to_string(),
                ensemble.clone(),
                "-".to_string(),
                "no sources".to_string(),
            ]);
            continue;
        }
        for source in sources {
            let status = if source.path.is_file() {
                "ok"
            } else {
                missing += 1;
                "missing"
            };
            table.add_row(vec![
                settings.name.clone(),
                settings.layout.to_string(),
                pipeline.clone(),
                settings.resample.step.to_string(),
                ensemble.clone(),
                source.path.display().to_string(),
                status.to_string(),
            ]);
        }
    }

    println!("{table}");
    println!(
        "{} dataset(s) valid, {missing} source file(s) missing. Output folder: {}",
        resolved.len(),
        config.output_folder.display()
    );
    Ok(())
}
