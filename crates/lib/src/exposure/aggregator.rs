//! Per-sample normalization with bounded parallel per-file reads.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::cache::ExposureCache;
use super::source::{ExposureSource, ExposureTotals};
use super::{ColumnReader, ExposureError};
use crate::consts::{POT_BRANCH, RUN_SUBRUN_TREES, SUBRUN_TREE};
use crate::recipe::{BeamKey, SampleType};

/// How a sample's exposure is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationPolicy {
  /// Sum per-file exposure; fall back to the run nominal when the sum is zero.
  Simulation,
  /// Use run-level totals.
  RunTotals,
}

impl AggregationPolicy {
  /// Detector variations are always simulation regardless of declared type.
  pub fn for_sample(sample_type: &SampleType, is_variation: bool) -> Self {
    if is_variation || sample_type.is_simulation() {
      AggregationPolicy::Simulation
    } else {
      AggregationPolicy::RunTotals
    }
  }
}

/// Run-level nominal values from the recipe.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunNominal {
  pub pot: f64,
  pub triggers: u64,
}

/// Computed normalization for one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
  pub pot: f64,
  /// Not computed for simulation.
  pub triggers: Option<u64>,
}

/// Inputs for one [`MetadataAggregator::aggregate`] call.
#[derive(Debug, Clone, Copy)]
pub struct AggregationRequest<'a> {
  pub sample_key: &'a str,
  pub sample_type: &'a SampleType,
  pub beam: &'a BeamKey,
  pub policy: AggregationPolicy,
  pub files: &'a [PathBuf],
  pub nominal: RunNominal,
}

/// Computes [`Normalization`]s for samples.
///
/// Owns the per-file exposure cache for one build. Per-file reads run as
/// blocking tasks, at most `jobs` at a time.
pub struct MetadataAggregator {
  reader: Arc<dyn ColumnReader>,
  cache: Arc<ExposureCache>,
  source: ExposureSource,
  semaphore: Arc<Semaphore>,
}

impl MetadataAggregator {
  pub fn new(reader: Arc<dyn ColumnReader>, source: ExposureSource, jobs: usize) -> Self {
    Self {
      reader,
      cache: Arc::new(ExposureCache::new()),
      source,
      semaphore: Arc::new(Semaphore::new(jobs.max(1))),
    }
  }

  pub fn cache(&self) -> &ExposureCache {
    &self.cache
  }

  pub fn source(&self) -> &ExposureSource {
    &self.source
  }

  pub async fn aggregate(&self, request: &AggregationRequest<'_>) -> Normalization {
    match request.policy {
      AggregationPolicy::Simulation => {
        let sum = self.sum_exposure(request.files).await;
        // Exactly zero covers both "no exposure" and "nothing readable".
        let pot = if sum == 0.0 {
          debug!(sample = %request.sample_key, pot = request.nominal.pot, "exposure sum is zero, using run nominal");
          request.nominal.pot
        } else {
          sum
        };
        Normalization { pot, triggers: None }
      }
      AggregationPolicy::RunTotals => {
        if matches!(self.source, ExposureSource::PerFileSum) {
          return Normalization {
            pot: request.nominal.pot,
            triggers: Some(request.nominal.triggers),
          };
        }

        let queried = match self.query_source(request).await {
          Ok(totals) => totals,
          Err(e) => {
            warn!(sample = %request.sample_key, source = self.source.name(), error = %e, "exposure query failed");
            ExposureTotals::default()
          }
        };
        info!(
          sample = %request.sample_key,
          source = self.source.name(),
          pot = queried.pot,
          triggers = queried.triggers,
          "queried run totals"
        );

        Normalization {
          pot: if queried.pot == 0.0 { request.nominal.pot } else { queried.pot },
          triggers: Some(if queried.triggers == 0 {
            request.nominal.triggers
          } else {
            queried.triggers
          }),
        }
      }
    }
  }

  /// Sum the exposure branch over `files`.
  ///
  /// Files that are missing or unreadable contribute zero. Values are added
  /// in file order so repeated builds agree bit for bit.
  pub async fn sum_exposure(&self, files: &[PathBuf]) -> f64 {
    let mut join_set = JoinSet::new();

    for (index, path) in files.iter().enumerate() {
      let path = path.clone();
      let reader = self.reader.clone();
      let cache = self.cache.clone();
      let semaphore = self.semaphore.clone();

      join_set.spawn(async move {
        let _permit = semaphore.acquire_owned().await.ok()?;
        tokio::task::spawn_blocking(move || read_exposure(reader.as_ref(), &cache, &path))
          .await
          .ok()
          .map(|value| (index, value))
      });
    }

    let mut values = vec![0.0; files.len()];
    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok(Some((index, value))) => values[index] = value,
        Ok(None) => warn!("exposure read task was cancelled"),
        Err(e) => error!(error = %e, "exposure read task panicked"),
      }
    }
    values.iter().sum()
  }

  /// Distinct `(run, subrun)` pairs across `files`.
  pub async fn run_subrun_pairs(&self, files: &[PathBuf]) -> BTreeSet<(u64, u64)> {
    let mut join_set = JoinSet::new();

    for path in files {
      let path = path.clone();
      let reader = self.reader.clone();
      let semaphore = self.semaphore.clone();

      join_set.spawn(async move {
        let _permit = semaphore.acquire_owned().await.ok()?;
        tokio::task::spawn_blocking(move || collect_run_subruns(reader.as_ref(), &path))
          .await
          .ok()
      });
    }

    let mut pairs = BTreeSet::new();
    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok(Some(found)) => pairs.extend(found),
        Ok(None) => warn!("run/subrun task was cancelled"),
        Err(e) => error!(error = %e, "run/subrun task panicked"),
      }
    }
    pairs
  }

  async fn query_source(&self, request: &AggregationRequest<'_>) -> Result<ExposureTotals, ExposureError> {
    match &self.source {
      ExposureSource::PerFileSum => Ok(ExposureTotals::default()),
      ExposureSource::SummaryLookup(table) => Ok(table.lookup(request.sample_key).unwrap_or_else(|| {
        warn!(sample = %request.sample_key, "sample missing from summary table");
        ExposureTotals::default()
      })),
      ExposureSource::ExternalScript(script) => {
        let pairs = self.run_subrun_pairs(request.files).await;
        if pairs.is_empty() {
          warn!(sample = %request.sample_key, "no run/subrun pairs found, skipping data info script");
          return Ok(ExposureTotals::default());
        }
        let script = script.clone();
        let beam = request.beam.clone();
        let sample_type = request.sample_type.clone();
        run_blocking(move || script.query(&pairs, &beam, &sample_type)).await
      }
      ExposureSource::TriggerDb(db) => {
        let pairs = self.run_subrun_pairs(request.files).await;
        if pairs.is_empty() {
          warn!(sample = %request.sample_key, "no run/subrun pairs found, skipping trigger database");
          return Ok(ExposureTotals::default());
        }
        let db = db.clone();
        run_blocking(move || db.query(&pairs)).await
      }
    }
  }
}

async fn run_blocking<F>(f: F) -> Result<ExposureTotals, ExposureError>
where
  F: FnOnce() -> Result<ExposureTotals, ExposureError> + Send + 'static,
{
  tokio::task::spawn_blocking(f)
    .await
    .map_err(|e| ExposureError::Script(format!("query task failed: {}", e)))?
}

/// Exposure of one file, memoized by `(path, mtime)`.
///
/// Failures are logged and read as zero; they are not cached.
pub(crate) fn read_exposure(reader: &dyn ColumnReader, cache: &ExposureCache, path: &Path) -> f64 {
  let modified = match std::fs::metadata(path).and_then(|meta| meta.modified()) {
    Ok(modified) => modified,
    Err(e) => {
      warn!(file = %path.display(), error = %e, "exposure file missing or unreadable");
      return 0.0;
    }
  };

  if let Some(value) = cache.get(path, modified) {
    return value;
  }

  match reader.read_branch(path, SUBRUN_TREE, POT_BRANCH) {
    Ok(values) => {
      let value: f64 = values.iter().sum();
      cache.insert(path, modified, value)
    }
    Err(e) => {
      warn!(file = %path.display(), error = %e, "could not read exposure");
      0.0
    }
  }
}

/// Run/subrun pairs from the first tree that has both branches.
fn collect_run_subruns(reader: &dyn ColumnReader, path: &Path) -> BTreeSet<(u64, u64)> {
  let mut pairs = BTreeSet::new();
  for tree in RUN_SUBRUN_TREES {
    let runs = reader.read_branch(path, tree, "run");
    let subruns = reader.read_branch(path, tree, "subRun");
    let (runs, subruns) = match (runs, subruns) {
      (Ok(runs), Ok(subruns)) => (runs, subruns),
      _ => continue,
    };
    pairs.extend(runs.iter().zip(subruns.iter()).map(|(r, s)| (*r as u64, *s as u64)));
    if !pairs.is_empty() {
      break;
    }
  }
  if pairs.is_empty() {
    warn!(file = %path.display(), "no run/subrun identifiers found");
  }
  pairs
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::exposure::{JsonTriggerTable, SummaryTable, TriggerDatabase, TriggerRow};
  use crate::util::testutil::{FakeReader, touch};
  use tempfile::TempDir;

  fn request<'a>(
    files: &'a [PathBuf],
    beam: &'a BeamKey,
    sample_type: &'a SampleType,
    policy: AggregationPolicy,
  ) -> AggregationRequest<'a> {
    AggregationRequest {
      sample_key: "sample",
      sample_type,
      beam,
      policy,
      files,
      nominal: RunNominal { pot: 4.0e20, triggers: 77 },
    }
  }

  #[test]
  fn variations_are_always_simulation() {
    assert_eq!(AggregationPolicy::for_sample(&SampleType::Mc, false), AggregationPolicy::Simulation);
    assert_eq!(AggregationPolicy::for_sample(&SampleType::Data, true), AggregationPolicy::Simulation);
    assert_eq!(AggregationPolicy::for_sample(&SampleType::Ext, false), AggregationPolicy::RunTotals);
    assert_eq!(AggregationPolicy::for_sample(&SampleType::Dirt, false), AggregationPolicy::RunTotals);
  }

  #[tokio::test]
  async fn simulation_sums_readable_files() {
    let temp = TempDir::new().unwrap();
    let files = vec![touch(temp.path(), "a.root"), touch(temp.path(), "b.root")];
    let reader = FakeReader::new().with_pot("a.root", 1.2e20);
    let aggregator = MetadataAggregator::new(Arc::new(reader), ExposureSource::PerFileSum, 4);
    let beam = BeamKey::parse("numi_fhc");

    let result = aggregator
      .aggregate(&request(&files, &beam, &SampleType::Mc, AggregationPolicy::Simulation))
      .await;

    assert_eq!(result, Normalization { pot: 1.2e20, triggers: None });
  }

  #[tokio::test]
  async fn simulation_falls_back_to_nominal_when_nothing_readable() {
    let temp = TempDir::new().unwrap();
    let files = vec![touch(temp.path(), "a.root"), temp.path().join("missing.root")];
    let aggregator = MetadataAggregator::new(Arc::new(FakeReader::new()), ExposureSource::PerFileSum, 2);
    let beam = BeamKey::parse("bnb");

    let result = aggregator
      .aggregate(&request(&files, &beam, &SampleType::Mc, AggregationPolicy::Simulation))
      .await;

    assert_eq!(result.pot, 4.0e20);
    assert_eq!(result.triggers, None);
  }

  #[tokio::test]
  async fn sum_is_order_independent_within_tolerance() {
    let temp = TempDir::new().unwrap();
    let mut reader = FakeReader::new();
    let mut files = Vec::new();
    for i in 0..16 {
      let name = format!("f{:02}.root", i);
      files.push(touch(temp.path(), &name));
      reader = reader.with_pot(&name, 1.0e19 + i as f64 * 3.3e17);
    }
    let expected: f64 = (0..16).map(|i| 1.0e19 + i as f64 * 3.3e17).sum();
    let aggregator = MetadataAggregator::new(Arc::new(reader), ExposureSource::PerFileSum, 3);

    let total = aggregator.sum_exposure(&files).await;
    assert!((total - expected).abs() / expected < 1e-12);
  }

  #[tokio::test]
  async fn run_totals_use_nominal_without_reading() {
    let reader = Arc::new(FakeReader::new());
    let aggregator = MetadataAggregator::new(reader.clone(), ExposureSource::PerFileSum, 2);
    let files = vec![PathBuf::from("/never/read.root")];
    let beam = BeamKey::parse("bnb");

    let result = aggregator
      .aggregate(&request(&files, &beam, &SampleType::Data, AggregationPolicy::RunTotals))
      .await;

    assert_eq!(result, Normalization { pot: 4.0e20, triggers: Some(77) });
    assert_eq!(reader.calls(), 0);
  }

  #[tokio::test]
  async fn repeated_reads_hit_the_cache() {
    let temp = TempDir::new().unwrap();
    let files = vec![touch(temp.path(), "a.root")];
    let reader = Arc::new(FakeReader::new().with_pot("a.root", 3.0));
    let aggregator = MetadataAggregator::new(reader.clone(), ExposureSource::PerFileSum, 1);

    assert_eq!(aggregator.sum_exposure(&files).await, 3.0);
    assert_eq!(aggregator.sum_exposure(&files).await, 3.0);
    assert_eq!(reader.calls(), 1);
    assert_eq!(aggregator.cache().len(), 1);
  }

  #[tokio::test]
  async fn failed_reads_are_not_cached() {
    let temp = TempDir::new().unwrap();
    let files = vec![touch(temp.path(), "a.root")];
    let reader = Arc::new(FakeReader::new());
    let aggregator = MetadataAggregator::new(reader.clone(), ExposureSource::PerFileSum, 1);

    assert_eq!(aggregator.sum_exposure(&files).await, 0.0);
    assert_eq!(aggregator.sum_exposure(&files).await, 0.0);
    assert_eq!(reader.calls(), 2);
    assert!(aggregator.cache().is_empty());
  }

  #[tokio::test]
  async fn summary_lookup_with_nominal_fallback() {
    let table: SummaryTable = [("sample".to_string(), ExposureTotals { pot: 1.5e20, triggers: 0 })]
      .into_iter()
      .collect();
    let aggregator = MetadataAggregator::new(
      Arc::new(FakeReader::new()),
      ExposureSource::SummaryLookup(Arc::new(table)),
      2,
    );
    let beam = BeamKey::parse("bnb");

    let result = aggregator
      .aggregate(&request(&[], &beam, &SampleType::Data, AggregationPolicy::RunTotals))
      .await;

    assert_eq!(result, Normalization { pot: 1.5e20, triggers: Some(77) });
  }

  #[tokio::test]
  async fn trigger_db_uses_pairs_from_files() {
    let temp = TempDir::new().unwrap();
    let files = vec![touch(temp.path(), "a.root"), touch(temp.path(), "b.root")];
    let reader = FakeReader::new()
      .with_runs("a.root", &[5, 5], &[1, 2])
      .with_runs("b.root", &[5], &[2]);
    let db: JsonTriggerTable = vec![
      TriggerRow { run: 5, subrun: 1, pot: 1.0e19, triggers: 100 },
      TriggerRow { run: 5, subrun: 2, pot: 2.0e19, triggers: 200 },
      TriggerRow { run: 6, subrun: 1, pot: 9.0e19, triggers: 900 },
    ]
    .into_iter()
    .collect();
    let aggregator = MetadataAggregator::new(Arc::new(reader), ExposureSource::TriggerDb(Arc::new(db)), 2);
    let beam = BeamKey::parse("bnb_ext");

    let pairs = aggregator.run_subrun_pairs(&files).await;
    assert_eq!(pairs.into_iter().collect::<Vec<_>>(), vec![(5, 1), (5, 2)]);

    let result = aggregator
      .aggregate(&request(&files, &beam, &SampleType::Ext, AggregationPolicy::RunTotals))
      .await;
    assert_eq!(result.triggers, Some(300));
    assert!((result.pot - 3.0e19).abs() < 1.0e6);
  }

  #[tokio::test]
  async fn trigger_db_without_pairs_falls_back() {
    let db: Arc<dyn TriggerDatabase> = Arc::new(JsonTriggerTable::default());
    let aggregator = MetadataAggregator::new(Arc::new(FakeReader::new()), ExposureSource::TriggerDb(db), 2);
    let beam = BeamKey::parse("bnb");

    let result = aggregator
      .aggregate(&request(&[], &beam, &SampleType::Data, AggregationPolicy::RunTotals))
      .await;
    assert_eq!(result, Normalization { pot: 4.0e20, triggers: Some(77) });
  }
}
