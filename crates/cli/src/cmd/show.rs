//! Show command implementation.
//!
//! Loads a written catalog and displays per-beam run and sample totals.

use std::path::Path;

use anyhow::{Context, Result};

use samcat_lib::catalog::Catalog;

use crate::output::{OutputFormat, format_pot, print_json, print_stat, print_success, symbols};

pub fn cmd_show(path: &Path, output: OutputFormat) -> Result<()> {
  let catalog = Catalog::load(path).with_context(|| format!("Failed to load catalog: {}", path.display()))?;
  let summary = catalog.summary();

  if output.is_json() {
    let json_output = serde_json::json!({
      "path": path,
      "produced_at": catalog.produced_at,
      "source_recipe_path": catalog.source_recipe_path,
      "source_recipe_hash": catalog.source_recipe_hash,
      "ntupledir": catalog.samples.ntupledir,
      "summary": summary,
    });
    return print_json(&json_output);
  }

  print_success(&format!("Catalog {}", path.display()));
  print_stat("Produced", &catalog.produced_at);
  print_stat(
    "Recipe",
    &format!("{} ({})", catalog.source_recipe_path, catalog.source_recipe_hash),
  );
  print_stat("Ntuple dir", &catalog.samples.ntupledir.display().to_string());
  println!();
  print_stat("Beams", &summary.beams.to_string());
  print_stat("Runs", &summary.runs.to_string());
  print_stat("Samples", &summary.samples.to_string());
  print_stat("Variations", &summary.variations.to_string());
  print_stat("Total POT", &format_pot(summary.total_pot));

  if !summary.per_beam.is_empty() {
    println!();
    println!("Beams:");
    for (beam, beam_summary) in &summary.per_beam {
      println!(
        "  {} {} [{}] {} sample(s), {} POT",
        symbols::INFO,
        beam,
        beam_summary.runs.join(", "),
        beam_summary.samples,
        format_pot(beam_summary.pot)
      );
    }
  }

  Ok(())
}
