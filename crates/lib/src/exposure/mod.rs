//! Normalization metadata (exposure and trigger counts) per sample.
//!
//! Simulation samples sum the per-file exposure branch; beam data and beam-off
//! samples take run-level totals, either the recipe's nominal values or those
//! reported by an external [`ExposureSource`].

mod aggregator;
mod cache;
mod datainfo;
mod reader;
mod source;

use std::path::PathBuf;

use thiserror::Error;

pub use aggregator::{AggregationPolicy, AggregationRequest, MetadataAggregator, Normalization, RunNominal};
pub use cache::ExposureCache;
pub use datainfo::{DataInfoScript, parse_ext_triggers, parse_pot};
pub use reader::{CommandColumnReader, parse_values};
pub use source::{ExposureSource, ExposureTotals, JsonTriggerTable, SummaryTable, TriggerDatabase, TriggerRow};

use crate::util::process::ProcessError;

/// Errors from reading exposure information.
///
/// None of these abort a build: per-file failures contribute zero and
/// run-level failures fall back to nominal values.
#[derive(Debug, Error)]
pub enum ExposureError {
  #[error("{tree}/{branch} not found in {}", path.display())]
  NotFound {
    path: PathBuf,
    tree: String,
    branch: String,
  },

  #[error("column reader '{program}' not found")]
  ReaderUnavailable { program: String },

  #[error("column reader failed on {}: {message}", path.display())]
  Reader { path: PathBuf, message: String },

  #[error("invalid numeric value '{value}'")]
  InvalidValue { value: String },

  #[error(transparent)]
  Process(#[from] ProcessError),

  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("data info script failed: {0}")]
  Script(String),
}

/// Reads a numeric branch out of a columnar file.
///
/// Implementations block; the aggregator calls them from blocking tasks.
pub trait ColumnReader: Send + Sync {
  fn read_branch(&self, path: &std::path::Path, tree: &str, branch: &str) -> Result<Vec<f64>, ExposureError>;
}
