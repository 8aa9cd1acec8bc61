//! Recipe document types.
//!
//! These mirror the on-disk JSON and are never mutated after loading; the
//! catalog builder produces separate output records.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether a recipe may be built or is only a starting point for copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipeKind {
  Template,
  #[default]
  Instance,
}

/// A loaded recipe document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
  /// Document role; must be `"recipe"`.
  #[serde(default)]
  pub role: Option<String>,

  #[serde(default)]
  pub recipe_kind: RecipeKind,

  /// Project slug used in catalog file names.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub project: Option<String>,

  /// Directory merged artifacts are written to.
  pub ntuple_base_directory: PathBuf,

  /// `beam_key -> beam block`.
  #[serde(default)]
  pub run_configurations: BTreeMap<String, BeamBlock>,
}

/// All runs recorded for one beam key, plus the beam-level switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamBlock {
  #[serde(default = "default_true")]
  pub active: bool,

  /// `run_name -> run block`; every key other than `active`.
  #[serde(flatten)]
  pub runs: BTreeMap<String, RunBlock>,
}

/// Nominal normalization and samples for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunBlock {
  /// Nominal exposure for beam-on data. Older recipes call it `nominal_pot`.
  #[serde(default, alias = "nominal_pot")]
  pub pot: f64,

  /// Nominal trigger count.
  #[serde(default)]
  pub ext_triggers: u64,

  #[serde(default)]
  pub samples: Vec<SampleEntry>,

  /// Fields the builder does not interpret; carried into the catalog.
  #[serde(flatten)]
  pub extra: BTreeMap<String, Value>,
}

/// One sample (or detector variation) as declared in the recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleEntry {
  pub sample_key: String,

  #[serde(default)]
  pub sample_type: SampleType,

  /// Workflow stage whose output directory holds this sample's inputs.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stage_name: Option<String>,

  #[serde(default = "default_true")]
  pub active: bool,

  /// Run the merge tool for this entry.
  #[serde(default)]
  pub do_hadd: bool,

  /// Short label of a detector variation, e.g. `cv` or `wiremod_x`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub variation_type: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub detector_variations: Option<Vec<SampleEntry>>,

  /// Fields the builder does not interpret; carried into the catalog.
  #[serde(flatten)]
  pub extra: BTreeMap<String, Value>,
}

/// Declared origin of a sample.
///
/// Unknown labels are preserved verbatim so they round-trip into the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SampleType {
  #[default]
  Mc,
  Data,
  Ext,
  Dirt,
  Other(String),
}

impl SampleType {
  pub fn as_str(&self) -> &str {
    match self {
      SampleType::Mc => "mc",
      SampleType::Data => "data",
      SampleType::Ext => "ext",
      SampleType::Dirt => "dirt",
      SampleType::Other(s) => s,
    }
  }

  /// Simulation samples normalise by summing per-file exposure.
  pub fn is_simulation(&self) -> bool {
    matches!(self, SampleType::Mc)
  }
}

impl From<String> for SampleType {
  fn from(value: String) -> Self {
    match value.as_str() {
      "mc" => SampleType::Mc,
      "data" => SampleType::Data,
      "ext" => SampleType::Ext,
      "dirt" => SampleType::Dirt,
      _ => SampleType::Other(value),
    }
  }
}

impl From<SampleType> for String {
  fn from(value: SampleType) -> Self {
    value.as_str().to_string()
  }
}

impl std::fmt::Display for SampleType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

fn default_true() -> bool {
  true
}
