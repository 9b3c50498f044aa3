pub mod archive;
pub mod config;
pub mod csv_decode;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod statistics;
pub mod store;

pub use error::{IntakeError, Result};
pub use pipeline::{IngestOutcome, IngestPipeline};
