use std::cell::RefCell;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::DataFrame;
use tracing::info;

use crate::error::{HarmonizeError, Result};
use crate::series::CanonicalSeries;

/// Persists a finished series under a caller-chosen name. Storing twice under one name
/// replaces the earlier artifact.
pub trait ArtifactStore {
    fn store(&self, name: &str, series: &CanonicalSeries) -> Result<()>;
}

/// Writes one Zstd-compressed parquet file per artifact into a directory.
#[derive(Debug, Clone)]
pub struct ParquetDirStore {
    root: PathBuf,
}

impl ParquetDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.parquet"))
    }
}

impl ArtifactStore for ParquetDirStore {
    fn store(&self, name: &str, series: &CanonicalSeries) -> Result<()> {
        validate_name(name)?;
        fs::create_dir_all(&self.root)?;

        let mut df = series.to_dataframe()?;
        let path = self.path_for(name);
        let file = File::create(&path)?;
        ParquetWriter::new(file)
            .with_compression(ParquetCompression::Zstd(None))
            .with_statistics(StatisticsOptions::default())
            .finish(&mut df)
            .map_err(|err| HarmonizeError::Store {
                name: name.to_string(),
                message: err.to_string(),
            })?;

        info!(artifact = name, path = %path.display(), rows = df.height(), "artifact written");
        Ok(())
    }
}

/// Keeps artifacts as polars frames in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    frames: RefCell<Vec<(String, DataFrame)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<String> {
        self.frames.borrow().iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<DataFrame> {
        self.frames
            .borrow()
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, df)| df.clone())
    }

    pub fn len(&self) -> usize {
        self.frames.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.borrow().is_empty()
    }
}

impl ArtifactStore for MemoryStore {
    fn store(&self, name: &str, series: &CanonicalSeries) -> Result<()> {
        validate_name(name)?;
        let df = series.to_dataframe()?;
        let mut frames = self.frames.borrow_mut();
        match frames.iter_mut().find(|(existing, _)| existing == name) {
            Some(slot) => slot.1 = df,
            None => frames.push((name.to_string(), df)),
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(HarmonizeError::Store {
            name: name.to_string(),
            message: "artifact names must be non-empty and contain no path separators".into(),
        });
    }
    Ok(())
}
