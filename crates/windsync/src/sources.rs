use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use windsync_core::config::{DatasetConfig, RunConfig};
use windsync_parser::{parse_raw_batch, RawBatch, ReadOptions};

pub const DATA_FOLDER_VAR: &str = "WINDSYNC_DATA_FOLDER";
pub const OUTPUT_FOLDER_VAR: &str = "WINDSYNC_OUTPUT_FOLDER";

const LOCATION_PLACEHOLDER: &str = "{location}";

/// Reads the TOML run configuration and applies folder overrides from the environment.
pub fn load_run_config(path: &Path) -> Result<RunConfig> {
    if !path.exists() {
        bail!("configuration file {} does not exist", path.display());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("could not read configuration file {}", path.display()))?;
    let mut config: RunConfig = toml::from_str(&text)
        .with_context(|| format!("configuration file {} is not a valid run configuration", path.display()))?;

    if let Ok(folder) = env::var(DATA_FOLDER_VAR) {
        info!(folder = %folder, "data folder overridden by {DATA_FOLDER_VAR}");
        config.data_folder = PathBuf::from(folder);
    }
    if let Ok(folder) = env::var(OUTPUT_FOLDER_VAR) {
        info!(folder = %folder, "output folder overridden by {OUTPUT_FOLDER_VAR}");
        config.output_folder = PathBuf::from(folder);
    }
    Ok(config)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Identifier carried through the engine; farm artifacts are named after it.
    pub label: String,
    pub path: PathBuf,
}

pub fn dataset_root(config: &RunConfig, dataset: &DatasetConfig) -> PathBuf {
    match &dataset.subfolder {
        Some(subfolder) => config.data_folder.join(subfolder),
        None => config.data_folder.clone(),
    }
}

/// Lists the files a dataset reads, in processing order.
///
/// With `file_template`, one file per location (`{location}` is the lowercased location
/// name) labelled with the location itself. With `source_glob`, every match under the
/// dataset folder sorted by path, labelled with the file stem.
pub fn discover(config: &RunConfig, dataset: &DatasetConfig) -> Result<Vec<SourceFile>> {
    let root = dataset_root(config, dataset);

    match (&dataset.file_template, &dataset.source_glob) {
        (Some(template), None) => {
            if !template.contains(LOCATION_PLACEHOLDER) {
                bail!(
                    "dataset '{}': file_template must contain {LOCATION_PLACEHOLDER}",
                    dataset.name
                );
            }
            if dataset.locations.is_empty() {
                bail!("dataset '{}': file_template needs at least one location", dataset.name);
            }
            Ok(dataset
                .locations
                .iter()
                .map(|location| SourceFile {
                    label: location.clone(),
                    path: root.join(template.replace(LOCATION_PLACEHOLDER, &location.to_lowercase())),
                })
                .collect())
        }
        (None, Some(pattern)) => {
            let full = root.join(pattern);
            let pattern_str = full
                .to_str()
                .with_context(|| format!("dataset '{}': source path is not valid UTF-8", dataset.name))?;

            let mut paths = Vec::new();
            for entry in glob::glob(pattern_str)
                .with_context(|| format!("dataset '{}': invalid source_glob '{pattern}'", dataset.name))?
            {
                match entry {
                    Ok(path) if path.is_file() => paths.push(path),
                    Ok(_) => {}
                    Err(err) => warn!(dataset = %dataset.name, error = %err, "unreadable glob entry"),
                }
            }
            paths.sort();

            Ok(paths
                .into_iter()
                .map(|path| SourceFile {
                    label: path
                        .file_stem()
                        .map(|stem| stem.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string()),
                    path,
                })
                .collect())
        }
        (Some(_), Some(_)) => bail!(
            "dataset '{}': set either file_template or source_glob, not both",
            dataset.name
        ),
        (None, None) => bail!(
            "dataset '{}': one of file_template or source_glob is required",
            dataset.name
        ),
    }
}

pub fn read_batch(source: &SourceFile, options: &ReadOptions) -> Result<RawBatch> {
    let content = fs::read_to_string(&source.path)
        .with_context(|| format!("failed to read {}", source.path.display()))?;
    parse_raw_batch(&source.label, &content, options)
        .with_context(|| format!("failed to parse {}", source.path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_config(data_folder: &Path, dataset: &str) -> RunConfig {
        let text = format!(
            "data_folder = {:?}\noutput_folder = \"out\"\n{dataset}",
            data_folder.display().to_string()
        );
        toml::from_str(&text).expect("config")
    }

    #[test]
    fn template_paths_use_lowercase_locations() {
        let config = run_config(
            Path::new("/data"),
            r#"
[[dataset]]
name = "farm"
layout = "farm_sensor_table"
subfolder = "farm"
resample_step_seconds = 600
locations = ["Alpha", "Bravo"]
file_template = "{location}_windspeed_COD_to_20230601.csv"
"#,
        );
        let sources = discover(&config, &config.datasets[0]).expect("discover");
        assert_eq!(
            sources,
            vec![
                SourceFile {
                    label: "Alpha".into(),
                    path: PathBuf::from("/data/farm/alpha_windspeed_COD_to_20230601.csv"),
                },
                SourceFile {
                    label: "Bravo".into(),
                    path: PathBuf::from("/data/farm/bravo_windspeed_COD_to_20230601.csv"),
                },
            ]
        );
    }

    #[test]
    fn glob_matches_are_sorted_by_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["2023q3.csv", "2023q1.csv", "2023q2.csv", "notes.txt"] {
            fs::write(dir.path().join(name), "t_unix,WTG\n").expect("write");
        }
        let config = run_config(
            dir.path(),
            r#"
[[dataset]]
name = "turbines"
layout = "turbine_export"
source_glob = "*.csv"
resample_step_seconds = 600
discriminator = "WTG"
entities = [{ key = 1 }]
"#,
        );
        let labels: Vec<String> = discover(&config, &config.datasets[0])
            .expect("discover")
            .into_iter()
            .map(|source| source.label)
            .collect();
        assert_eq!(labels, vec!["2023q1", "2023q2", "2023q3"]);
    }

    #[test]
    fn template_and_glob_are_exclusive() {
        let config = run_config(
            Path::new("/data"),
            r#"
[[dataset]]
name = "farm"
layout = "farm_sensor_table"
resample_step_seconds = 600
locations = ["Alpha"]
file_template = "{location}.csv"
source_glob = "*.csv"
"#,
        );
        assert!(discover(&config, &config.datasets[0]).is_err());
    }

    #[test]
    fn missing_config_file_is_reported_as_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_run_config(&dir.path().join("absent.toml")).expect_err("missing");
        assert!(err.to_string().contains("does not exist"));

        let invalid = dir.path().join("invalid.toml");
        fs::write(&invalid, "data_folder = ").expect("write");
        let err = load_run_config(&invalid).expect_err("invalid");
        assert!(err.to_string().contains("not a valid run configuration"));
    }
}
