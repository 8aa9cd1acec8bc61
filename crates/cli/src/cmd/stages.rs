//! Implementation of the `samcat stages` command.
//!
//! Resolves stage names to output directories from workflow XML and JSON
//! stage maps, the same way `samcat build` does.

use std::path::PathBuf;

use anyhow::{Context, Result};

use samcat_lib::config::BuildConfig;
use samcat_lib::stage::StageOutdirMap;

use crate::StageSources;
use crate::output::{OutputFormat, print_info, print_json, print_warning, symbols};

pub fn cmd_stages(sources: &StageSources, output: OutputFormat) -> Result<()> {
  let fallback = BuildConfig::from_env().context("Invalid SAMCAT_* environment")?.workflow_xml;
  let map = load_stage_map(sources, &fallback)?;

  if output.is_json() {
    return print_json(&map);
  }

  if map.is_empty() {
    print_warning("No stages defined");
    return Ok(());
  }

  for (stage, outdir) in map.iter() {
    println!("  {} {} {}", stage, symbols::ARROW, outdir);
  }
  println!();
  print_info(&format!("{} stage(s)", map.len()));

  Ok(())
}

/// Load the stage map, using `fallback_xml` when no XML was passed explicitly.
pub(crate) fn load_stage_map(sources: &StageSources, fallback_xml: &[PathBuf]) -> Result<StageOutdirMap> {
  let xml = if sources.xml.is_empty() {
    fallback_xml
  } else {
    sources.xml.as_slice()
  };
  StageOutdirMap::load(xml, &sources.stage_maps).context("Failed to load stage definitions")
}
