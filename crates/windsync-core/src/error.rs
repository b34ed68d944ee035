// crates/windsync-core/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarmonizeError {
    /// Unrecognized or unparsable timestamp column. Fatal for the batch only.
    #[error("schema error in source '{source_id}': {message}")]
    Schema { source_id: String, message: String },

    /// A record whose discriminator is outside the configured entity set.
    #[error("stitch error in source '{source_id}': {message}")]
    Stitch { source_id: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("audit error for '{entity}': {message}")]
    Audit { entity: String, message: String },

    #[error("failed to store artifact '{name}': {message}")]
    Store { name: String, message: String },

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarmonizeError {
    pub(crate) fn schema(source_id: &str, message: impl Into<String>) -> Self {
        HarmonizeError::Schema {
            source_id: source_id.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        HarmonizeError::Config(message.into())
    }

    /// Settings that fail to resolve make the whole run unusable. Pipelines never return
    /// per-source failures through `Err`; they are listed in the dataset outcome instead.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, HarmonizeError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, HarmonizeError>;
