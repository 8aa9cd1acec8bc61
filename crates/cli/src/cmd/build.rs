//! Implementation of the `samcat build` command.
//!
//! Layers command-line flags over the environment-derived [`BuildConfig`],
//! resolves stages, runs the catalog pipeline and reports what was skipped.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::debug;

use samcat_lib::catalog::{BuiltCatalog, build_catalog};
use samcat_lib::config::{BuildConfig, ExposureSourceKind, parse_runs};
use samcat_lib::consts::RECIPE_HASH_PREFIX_LEN;
use samcat_lib::exposure::{ColumnReader, CommandColumnReader};

use super::stages::load_stage_map;
use crate::BuildArgs;
use crate::output::{format_elapsed, format_pot, print_info, print_json, print_stat, print_success, print_warning};

pub fn cmd_build(args: BuildArgs) -> Result<()> {
  let start = Instant::now();

  if !args.recipe.exists() {
    anyhow::bail!("Recipe not found: {}", args.recipe.display());
  }

  let mut config = BuildConfig::from_env().context("Invalid SAMCAT_* environment")?;
  apply_args(&mut config, &args)?;
  debug!(?config, "resolved build configuration");

  let stages = load_stage_map(&args.sources, &config.workflow_xml)?;
  let source = config
    .exposure
    .build(config.reader_timeout)
    .context("Failed to set up exposure source")?;
  let reader: Arc<dyn ColumnReader> = Arc::new(CommandColumnReader::new(config.reader.clone(), config.reader_timeout));

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let built = rt
    .block_on(build_catalog(&args.recipe, stages, &config, reader, source))
    .with_context(|| format!("Failed to build catalog from {}", args.recipe.display()))?;

  if args.output.is_json() {
    let summary = built.catalog.summary();
    let json_output = serde_json::json!({
      "path": built.path,
      "recipe_hash": built.recipe_hash.0,
      "dry_run": config.dry_run,
      "summary": summary,
      "report": built.report,
    });
    return print_json(&json_output);
  }

  print_report(&built, config.dry_run);
  print_stat("Elapsed", &format_elapsed(start.elapsed()));

  Ok(())
}

fn apply_args(config: &mut BuildConfig, args: &BuildArgs) -> Result<()> {
  if let Some(runs) = &args.runs {
    config.runs = parse_runs(runs);
  }
  if let Some(outdir) = &args.outdir {
    config.outdir = outdir.clone();
  }
  if let Some(project) = &args.project {
    config.project = Some(project.clone());
  }
  if let Some(jobs) = args.jobs {
    anyhow::ensure!(jobs > 0, "--jobs must be at least 1");
    config.jobs = jobs;
  }
  if let Some(tool) = &args.merge_tool {
    config.merge_tool = tool.clone();
  }
  if let Some(reader) = &args.reader {
    config.reader = reader.clone();
  }
  if let Some(timeout) = args.merge_timeout {
    config.merge_timeout = Some(timeout);
  }
  if let Some(timeout) = args.reader_timeout {
    config.reader_timeout = Some(timeout);
  }
  if let Some(kind) = &args.exposure_source {
    config.exposure.kind = kind.parse::<ExposureSourceKind>()?;
  }
  if let Some(input) = &args.exposure_input {
    config.exposure.input = Some(input.clone());
  }
  config.dry_run |= args.dry_run;
  config.force |= args.force;
  Ok(())
}

fn print_report(built: &BuiltCatalog, dry_run: bool) {
  let summary = built.catalog.summary();
  let report = &built.report;

  print_success(&format!("Wrote {}", built.path.display()));
  print_stat("Recipe hash", built.recipe_hash.short(RECIPE_HASH_PREFIX_LEN));
  print_stat("Beams", &summary.beams.to_string());
  print_stat("Runs", &summary.runs.to_string());
  print_stat("Samples", &summary.samples.to_string());
  print_stat("Variations", &summary.variations.to_string());
  print_stat("Total POT", &format_pot(summary.total_pot));

  if dry_run {
    print_info("Dry run: no merges were executed");
  }

  for key in &report.without_inputs {
    print_warning(&format!("{}: no artifacts in stage directory", key));
  }
  for skipped in &report.skipped {
    let kind = if skipped.variation { "variation " } else { "" };
    print_warning(&format!(
      "skipped {}{} ({}/{}): {}",
      kind, skipped.sample_key, skipped.beam, skipped.run, skipped.reason
    ));
  }
}
