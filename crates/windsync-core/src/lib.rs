pub mod audit;
pub mod config;
pub mod ensemble;
pub mod error;
pub mod normalize;
pub mod pipelines;
pub mod resample;
pub mod series;
pub mod stitch;
pub mod store;

pub use error::{HarmonizeError, Result};
pub use series::{CanonicalSeries, Channel, KeyColumn, TIMESTAMP_FIELD};
