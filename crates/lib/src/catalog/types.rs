//! Catalog document types.
//!
//! Output records are built fresh by the builder; nothing here aliases the
//! recipe they were derived from.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::CatalogError;
use crate::recipe::SampleType;

/// Recipe fields that are either consumed by the build or recomputed by it.
pub(crate) const COMPUTED_KEYS: &[&str] = &[
  "pot",
  "triggers",
  "dataset_id",
  "relative_path",
  "stage_name",
  "do_hadd",
];

/// `beam_key -> run_name -> run record`.
pub type RunConfigurations = BTreeMap<String, BTreeMap<String, RunRecord>>;

/// A written catalog document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
  pub role: String,
  pub schema_version: String,
  pub produced_at: String,
  pub source_recipe_path: String,
  pub source_recipe_hash: String,
  pub samples: CatalogSamples,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSamples {
  /// Directory merged artifacts live in; `relative_path`s resolve against it.
  pub ntupledir: PathBuf,
  pub run_configurations: RunConfigurations,
}

/// One run in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
  pub pot: f64,
  pub ext_triggers: u64,
  pub samples: Vec<SampleRecord>,
  #[serde(flatten)]
  pub extra: BTreeMap<String, Value>,
}

/// One processed sample or detector variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
  pub sample_key: String,
  pub sample_type: SampleType,
  pub active: bool,
  pub dataset_id: String,
  pub relative_path: String,
  pub pot: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub triggers: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub variation_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub detector_variations: Option<Vec<SampleRecord>>,
  #[serde(flatten)]
  pub extra: BTreeMap<String, Value>,
}

/// Totals over a catalog, for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogSummary {
  pub beams: usize,
  pub runs: usize,
  pub samples: usize,
  pub variations: usize,
  /// Sum of top-level sample exposure (variations excluded).
  pub total_pot: f64,
  pub per_beam: BTreeMap<String, BeamSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BeamSummary {
  pub runs: Vec<String>,
  pub samples: usize,
  pub pot: f64,
}

impl Catalog {
  pub fn load(path: &Path) -> Result<Self, CatalogError> {
    let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_str(&text).map_err(|source| CatalogError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  pub fn summary(&self) -> CatalogSummary {
    let mut summary = CatalogSummary::default();
    for (beam, runs) in &self.samples.run_configurations {
      let beam_summary = summary.per_beam.entry(beam.clone()).or_default();
      for (run, record) in runs {
        beam_summary.runs.push(run.clone());
        for sample in &record.samples {
          beam_summary.samples += 1;
          beam_summary.pot += sample.pot;
          summary.variations += sample.detector_variations.as_ref().map_or(0, Vec::len);
        }
      }
      summary.runs += runs.len();
    }
    summary.beams = summary.per_beam.len();
    summary.samples = summary.per_beam.values().map(|b| b.samples).sum();
    summary.total_pot = summary.per_beam.values().map(|b| b.pot).sum();
    summary
  }

  /// Find a sample or variation by dataset id.
  pub fn find(&self, dataset_id: &str) -> Option<&SampleRecord> {
    self
      .samples
      .run_configurations
      .values()
      .flat_map(|runs| runs.values())
      .flat_map(|run| run.samples.iter())
      .flat_map(|sample| std::iter::once(sample).chain(sample.detector_variations.iter().flatten()))
      .find(|sample| sample.dataset_id == dataset_id)
  }
}

/// Recipe extras minus the keys the build consumes or recomputes.
pub(crate) fn passthrough_fields(extra: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
  extra
    .iter()
    .filter(|(key, _)| !COMPUTED_KEYS.contains(&key.as_str()))
    .map(|(key, value)| (key.clone(), value.clone()))
    .collect()
}
