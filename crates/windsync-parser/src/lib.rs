pub mod errors;
pub mod formats;
pub mod model;
mod registry;

pub use errors::{ParserAttempt, ParserError};
pub use model::{RawBatch, RawValue, ReadOptions};
pub use registry::{parse_raw_batch, parse_with_parsers, RawBatchParser};
