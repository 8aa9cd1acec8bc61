//! Run-level exposure sources for beam data and beam-off samples.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ExposureError;
use super::datainfo::DataInfoScript;

/// Exposure and trigger totals for a set of subruns or a sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExposureTotals {
  #[serde(default)]
  pub pot: f64,
  #[serde(default)]
  pub triggers: u64,
}

/// Where beam data and beam-off samples get their totals.
///
/// Simulation samples always sum per-file exposure regardless of the source.
#[derive(Clone, Default)]
pub enum ExposureSource {
  /// Run nominal values from the recipe.
  #[default]
  PerFileSum,
  /// External data-info script queried with the samples' run/subrun pairs.
  ExternalScript(Arc<DataInfoScript>),
  /// Trigger database queried with the samples' run/subrun pairs.
  TriggerDb(Arc<dyn TriggerDatabase>),
  /// Precomputed per-sample totals.
  SummaryLookup(Arc<SummaryTable>),
}

impl ExposureSource {
  pub fn name(&self) -> &'static str {
    match self {
      ExposureSource::PerFileSum => "per-file-sum",
      ExposureSource::ExternalScript(_) => "external-script",
      ExposureSource::TriggerDb(_) => "trigger-db",
      ExposureSource::SummaryLookup(_) => "summary-lookup",
    }
  }

  /// Whether the source needs run/subrun pairs from the sample's files.
  pub fn needs_run_subruns(&self) -> bool {
    matches!(self, ExposureSource::ExternalScript(_) | ExposureSource::TriggerDb(_))
  }
}

impl fmt::Debug for ExposureSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Aggregate counts for a set of `(run, subrun)` pairs.
pub trait TriggerDatabase: Send + Sync {
  fn query(&self, pairs: &BTreeSet<(u64, u64)>) -> Result<ExposureTotals, ExposureError>;
}

/// One subrun's counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRow {
  pub run: u64,
  pub subrun: u64,
  #[serde(default)]
  pub pot: f64,
  #[serde(default)]
  pub triggers: u64,
}

/// Trigger database exported as a JSON array of [`TriggerRow`]s.
#[derive(Debug, Clone, Default)]
pub struct JsonTriggerTable {
  rows: HashMap<(u64, u64), TriggerRow>,
}

impl JsonTriggerTable {
  pub fn load(path: &Path) -> Result<Self, ExposureError> {
    let text = std::fs::read_to_string(path).map_err(|source| ExposureError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let rows: Vec<TriggerRow> = serde_json::from_str(&text).map_err(|source| ExposureError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(rows.into_iter().collect())
  }
}

impl FromIterator<TriggerRow> for JsonTriggerTable {
  fn from_iter<I: IntoIterator<Item = TriggerRow>>(iter: I) -> Self {
    Self {
      rows: iter.into_iter().map(|row| ((row.run, row.subrun), row)).collect(),
    }
  }
}

impl TriggerDatabase for JsonTriggerTable {
  fn query(&self, pairs: &BTreeSet<(u64, u64)>) -> Result<ExposureTotals, ExposureError> {
    Ok(
      pairs
        .iter()
        .filter_map(|pair| self.rows.get(pair))
        .fold(ExposureTotals::default(), |acc, row| ExposureTotals {
          pot: acc.pot + row.pot,
          triggers: acc.triggers + row.triggers,
        }),
    )
  }
}

/// Per-sample totals loaded from a JSON object `{sample_key: {pot, triggers}}`.
#[derive(Debug, Clone, Default)]
pub struct SummaryTable {
  samples: HashMap<String, ExposureTotals>,
}

impl SummaryTable {
  pub fn load(path: &Path) -> Result<Self, ExposureError> {
    let text = std::fs::read_to_string(path).map_err(|source| ExposureError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let samples = serde_json::from_str(&text).map_err(|source| ExposureError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(Self { samples })
  }

  pub fn lookup(&self, sample_key: &str) -> Option<ExposureTotals> {
    self.samples.get(sample_key).copied()
  }
}

impl FromIterator<(String, ExposureTotals)> for SummaryTable {
  fn from_iter<I: IntoIterator<Item = (String, ExposureTotals)>>(iter: I) -> Self {
    Self {
      samples: iter.into_iter().collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn trigger_table_sums_requested_pairs_only() {
    let table: JsonTriggerTable = vec![
      TriggerRow { run: 1, subrun: 1, pot: 1.0e18, triggers: 10 },
      TriggerRow { run: 1, subrun: 2, pot: 2.0e18, triggers: 20 },
      TriggerRow { run: 2, subrun: 1, pot: 4.0e18, triggers: 40 },
    ]
    .into_iter()
    .collect();

    let pairs: BTreeSet<_> = [(1, 2), (2, 1), (9, 9)].into_iter().collect();
    let totals = table.query(&pairs).unwrap();
    assert_eq!(totals.triggers, 60);
    assert!((totals.pot - 6.0e18).abs() < 1.0);
  }

  #[test]
  fn trigger_table_loads_json() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("triggers.json");
    std::fs::write(&path, r#"[{"run": 5, "subrun": 3, "pot": 1.5e17, "triggers": 7}]"#).unwrap();

    let table = JsonTriggerTable::load(&path).unwrap();
    let totals = table.query(&[(5, 3)].into_iter().collect()).unwrap();
    assert_eq!(totals, ExposureTotals { pot: 1.5e17, triggers: 7 });
  }

  #[test]
  fn summary_table_lookup() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("summary.json");
    std::fs::write(&path, r#"{"numi_fhc_data": {"pot": 2.0e20, "triggers": 1000}, "ext": {"triggers": 5}}"#).unwrap();

    let table = SummaryTable::load(&path).unwrap();
    assert_eq!(table.lookup("numi_fhc_data").unwrap().pot, 2.0e20);
    assert_eq!(table.lookup("ext").unwrap(), ExposureTotals { pot: 0.0, triggers: 5 });
    assert!(table.lookup("absent").is_none());
  }

  #[test]
  fn summary_table_bad_json_is_parse_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("summary.json");
    std::fs::write(&path, "not json").unwrap();
    assert!(matches!(SummaryTable::load(&path), Err(ExposureError::Parse { .. })));
  }

  #[test]
  fn source_names() {
    assert_eq!(ExposureSource::default().name(), "per-file-sum");
    assert!(!ExposureSource::PerFileSum.needs_run_subruns());
    let db: Arc<dyn TriggerDatabase> = Arc::new(JsonTriggerTable::default());
    assert!(ExposureSource::TriggerDb(db).needs_run_subruns());
  }
}
