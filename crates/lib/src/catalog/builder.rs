//! Walks a recipe and produces the catalog's run/sample tree.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::types::{RunConfigurations, RunRecord, SampleRecord, passthrough_fields};
use crate::config::BuildConfig;
use crate::consts::{ARTIFACT_EXTENSION, DEFAULT_STAGE};
use crate::dataset_id::{DatasetIdParts, Subset};
use crate::discovery::FileDiscovery;
use crate::exposure::{AggregationPolicy, AggregationRequest, ColumnReader, ExposureSource, MetadataAggregator, RunNominal};
use crate::merge::{MergeExecutor, MergeOutcome};
use crate::recipe::{BeamKey, Recipe, RecipeError, RunBlock, SampleEntry};
use crate::stage::StageOutdirMap;

/// Why a sample or variation is absent from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
  Inactive,
  StageNotFound { stage: Option<String> },
  MergeFailed { message: String },
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SkipReason::Inactive => write!(f, "inactive"),
      SkipReason::StageNotFound { stage: Some(stage) } => write!(f, "stage '{}' not found", stage),
      SkipReason::StageNotFound { stage: None } => write!(f, "no stage_name"),
      SkipReason::MergeFailed { message } => write!(f, "merge failed: {}", message),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSample {
  pub beam: String,
  pub run: String,
  pub sample_key: String,
  pub variation: bool,
  #[serde(flatten)]
  pub reason: SkipReason,
}

/// What happened during a build, beyond the catalog tree itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildReport {
  /// Samples and variations included in the catalog.
  pub processed: usize,
  /// Entries whose stage directory held no artifacts.
  pub without_inputs: Vec<String>,
  pub skipped: Vec<SkippedSample>,
}

/// Result of [`CatalogBuilder::build`].
#[derive(Debug, Clone)]
pub struct BuildOutput {
  pub run_configurations: RunConfigurations,
  pub report: BuildReport,
}

/// Per-run values shared by every sample in the run.
struct RunContext<'a> {
  beam: &'a BeamKey,
  run: &'a str,
  nominal: RunNominal,
}

/// Builds the catalog tree for one recipe.
///
/// Owns the per-build caches (artifact listings, per-file exposure); a new
/// builder starts cold.
pub struct CatalogBuilder<'a> {
  recipe: &'a Recipe,
  config: &'a BuildConfig,
  stages: Arc<StageOutdirMap>,
  discovery: FileDiscovery,
  merger: MergeExecutor,
  aggregator: MetadataAggregator,
}

impl<'a> CatalogBuilder<'a> {
  pub fn new(
    recipe: &'a Recipe,
    config: &'a BuildConfig,
    stages: Arc<StageOutdirMap>,
    reader: Arc<dyn ColumnReader>,
    source: ExposureSource,
  ) -> Self {
    Self {
      recipe,
      config,
      stages,
      discovery: FileDiscovery::new(),
      merger: MergeExecutor::new(config.merge_tool.clone(), config.merge_timeout),
      aggregator: MetadataAggregator::new(reader, source, config.jobs),
    }
  }

  pub fn aggregator(&self) -> &MetadataAggregator {
    &self.aggregator
  }

  pub fn discovery(&self) -> &FileDiscovery {
    &self.discovery
  }

  /// Process every active beam, selected run and active sample.
  ///
  /// Only recipe-level guard failures are errors. Anything scoped to one
  /// sample is logged, recorded in the report, and the sample is left out.
  pub async fn build(&self) -> Result<BuildOutput, RecipeError> {
    self.recipe.validate()?;

    let mut run_configurations = RunConfigurations::new();
    let mut report = BuildReport::default();

    for (beam_key, block) in &self.recipe.run_configurations {
      if !block.active {
        info!(beam = %beam_key, "skipping beam (active=false)");
        continue;
      }

      let beam = BeamKey::parse(beam_key);
      let mut runs_out = BTreeMap::new();

      for (run, run_block) in &block.runs {
        if !self.config.runs.is_empty() && !self.config.runs.iter().any(|r| r == run) {
          debug!(beam = %beam_key, run = %run, "run not selected");
          continue;
        }

        info!(beam = %beam_key, run = %run, "processing run");
        let ctx = RunContext {
          beam: &beam,
          run,
          nominal: nominal_for(&beam, run, run_block),
        };

        let mut samples = Vec::with_capacity(run_block.samples.len());
        for entry in &run_block.samples {
          if let Some(record) = self.process_sample(&ctx, entry, &mut report).await {
            samples.push(record);
          }
        }

        runs_out.insert(
          run.clone(),
          RunRecord {
            pot: run_block.pot,
            ext_triggers: run_block.ext_triggers,
            samples,
            extra: run_block.extra.clone(),
          },
        );
      }

      if !runs_out.is_empty() {
        run_configurations.insert(beam_key.clone(), runs_out);
      }
    }

    info!(
      processed = report.processed,
      skipped = report.skipped.len(),
      "catalog tree built"
    );
    Ok(BuildOutput {
      run_configurations,
      report,
    })
  }

  /// A top-level sample and its detector variations.
  async fn process_sample(
    &self,
    ctx: &RunContext<'_>,
    entry: &SampleEntry,
    report: &mut BuildReport,
  ) -> Option<SampleRecord> {
    if !entry.active {
      info!(sample = %entry.sample_key, "skipping sample (inactive)");
      report.skipped.push(skipped(ctx, entry, false, SkipReason::Inactive));
      return None;
    }

    let origin = entry.sample_type.as_str();
    let id_parts = DatasetIdParts {
      beamline: &ctx.beam.beamline,
      mode: &ctx.beam.mode,
      run: ctx.run,
      origin,
      subset: Subset::infer(&entry.sample_key, origin),
      stage_name: entry.stage_name.as_deref().unwrap_or(DEFAULT_STAGE),
      variation: None,
    };

    let mut record = match self.process_entry(ctx, entry, id_parts, false, report).await {
      Ok(record) => record,
      Err(reason) => {
        report.skipped.push(skipped(ctx, entry, false, reason));
        return None;
      }
    };

    if let Some(variations) = &entry.detector_variations {
      let mut records = Vec::with_capacity(variations.len());
      for variation in variations {
        if !variation.active {
          info!(sample = %variation.sample_key, "skipping detector variation (inactive)");
          report.skipped.push(skipped(ctx, variation, true, SkipReason::Inactive));
          continue;
        }

        let token = variation.variation_type.as_deref().unwrap_or(&variation.sample_key);
        let parts = id_parts.with_variation(Some(token));
        match self.process_entry(ctx, variation, parts, true, report).await {
          Ok(record) => records.push(record),
          Err(reason) => report.skipped.push(skipped(ctx, variation, true, reason)),
        }
      }
      record.detector_variations = Some(records);
    }

    Some(record)
  }

  /// Resolve, discover, merge and aggregate one entry.
  async fn process_entry(
    &self,
    ctx: &RunContext<'_>,
    entry: &SampleEntry,
    id_parts: DatasetIdParts<'_>,
    is_variation: bool,
    report: &mut BuildReport,
  ) -> Result<SampleRecord, SkipReason> {
    let kind = if is_variation { "detector variation" } else { "sample" };
    let stage = entry.stage_name.as_deref();
    info!(sample = %entry.sample_key, stage = stage.unwrap_or("-"), "processing {}", kind);

    let Some(input_dir) = stage.and_then(|s| self.stages.resolve(s)) else {
      warn!(sample = %entry.sample_key, stage = stage.unwrap_or("-"), "stage not found in workflow outdirs, skipping {}", kind);
      return Err(SkipReason::StageNotFound {
        stage: stage.map(String::from),
      });
    };

    let relative_path = format!("{}.{}", entry.sample_key, ARTIFACT_EXTENSION);
    let destination = self.recipe.ntuple_base_directory.join(&relative_path);

    let files = self.discovery.list_artifacts(input_dir);
    if files.is_empty() {
      warn!(sample = %entry.sample_key, dir = %input_dir.display(), "no artifacts found, merge will be skipped");
      report.without_inputs.push(entry.sample_key.clone());
    }

    let execute = entry.do_hadd && !self.config.dry_run;
    let outcome = match self.merger.merge(&files, &destination, execute).await {
      Ok(outcome) => outcome,
      Err(e) => {
        error!(sample = %entry.sample_key, error = %e, "merge failed, skipping {}", kind);
        return Err(SkipReason::MergeFailed { message: e.to_string() });
      }
    };

    let sources: Vec<PathBuf> = match outcome {
      MergeOutcome::Merged => vec![destination],
      MergeOutcome::DryRun | MergeOutcome::NoInputs => files.to_vec(),
    };

    let normalization = self
      .aggregator
      .aggregate(&AggregationRequest {
        sample_key: &entry.sample_key,
        sample_type: &entry.sample_type,
        beam: ctx.beam,
        policy: AggregationPolicy::for_sample(&entry.sample_type, is_variation),
        files: &sources,
        nominal: ctx.nominal,
      })
      .await;

    report.processed += 1;
    Ok(SampleRecord {
      sample_key: entry.sample_key.clone(),
      sample_type: entry.sample_type.clone(),
      active: entry.active,
      dataset_id: id_parts.make_id(),
      relative_path,
      pot: normalization.pot,
      triggers: normalization.triggers,
      variation_type: entry.variation_type.clone(),
      detector_variations: None,
      extra: passthrough_fields(&entry.extra),
    })
  }
}

/// Nominal run totals; beam-off runs have no exposure.
fn nominal_for(beam: &BeamKey, run: &str, block: &RunBlock) -> RunNominal {
  let pot = if beam.is_off_beam() {
    0.0
  } else {
    if block.pot == 0.0 {
      warn!(beam = %beam.key, run = %run, "no POT provided for on-beam run");
    }
    block.pot
  };
  RunNominal {
    pot,
    triggers: block.ext_triggers,
  }
}

fn skipped(ctx: &RunContext<'_>, entry: &SampleEntry, variation: bool, reason: SkipReason) -> SkippedSample {
  SkippedSample {
    beam: ctx.beam.key.clone(),
    run: ctx.run.to_string(),
    sample_key: entry.sample_key.clone(),
    variation,
    reason,
  }
}
