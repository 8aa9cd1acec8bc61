//! CLI smoke tests for samcat.
//!
//! These tests verify that all CLI commands run without panicking and
//! return appropriate exit codes.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the samcat binary with no SAMCAT_* overrides leaking in.
fn samcat_cmd() -> Command {
  let mut cmd = cargo_bin_cmd!("samcat");
  for var in ["SAMCAT_MERGE_TOOL", "SAMCAT_READER", "SAMCAT_JOBS", "SAMCAT_WORKFLOW_XML"] {
    cmd.env_remove(var);
  }
  cmd
}

/// A stage directory with two artifacts, a stage map pointing at it and a recipe.
struct Fixture {
  temp: TempDir,
}

impl Fixture {
  fn new(recipe_kind: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let beam = temp.path().join("out/beam");
    std::fs::create_dir_all(&beam).unwrap();
    std::fs::write(beam.join("a.root"), "a").unwrap();
    std::fs::write(beam.join("b.root"), "b").unwrap();

    let stages = serde_json::json!({ "selection_beam": beam });
    std::fs::write(temp.path().join("stages.json"), stages.to_string()).unwrap();

    let recipe = serde_json::json!({
      "role": "recipe",
      "recipe_kind": recipe_kind,
      "project": "smoke",
      "ntuple_base_directory": temp.path().join("ntuples"),
      "run_configurations": {
        "bnb_data": {
          "run1": {
            "pot": 2.0e20,
            "samples": [
              { "sample_key": "bnb_overlay", "sample_type": "mc", "stage_name": "selection_beam", "do_hadd": true },
              { "sample_key": "bnb_missing", "sample_type": "mc", "stage_name": "selection_nowhere" }
            ]
          }
        }
      }
    });
    std::fs::write(temp.path().join("recipe.json"), recipe.to_string()).unwrap();

    Self { temp }
  }

  fn path(&self, relative: &str) -> PathBuf {
    self.temp.path().join(relative)
  }

  fn build(&self) -> Command {
    let mut cmd = samcat_cmd();
    cmd
      .arg("build")
      .arg("--recipe")
      .arg(self.path("recipe.json"))
      .arg("--stages")
      .arg(self.path("stages.json"))
      .arg("--outdir")
      .arg(self.path("catalogs"))
      .arg("--reader")
      .arg("samcat-test-no-such-reader")
      .arg("--dry-run");
    cmd
  }

  fn only_catalog(&self) -> PathBuf {
    let entries: Vec<_> = std::fs::read_dir(self.path("catalogs"))
      .unwrap()
      .map(|e| e.unwrap().path())
      .collect();
    assert_eq!(entries.len(), 1, "{:?}", entries);
    entries.into_iter().next().unwrap()
  }
}

fn read_json(path: &Path) -> serde_json::Value {
  serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  samcat_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  samcat_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("samcat"));
}

#[test]
fn subcommand_help_works() {
  for cmd in &["build", "stages", "show"] {
    samcat_cmd()
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

// =============================================================================
// build
// =============================================================================

#[test]
fn build_requires_recipe_flag() {
  samcat_cmd().arg("build").assert().failure();
}

#[test]
fn build_fails_for_missing_recipe() {
  let temp = TempDir::new().unwrap();

  samcat_cmd()
    .arg("build")
    .arg("--recipe")
    .arg(temp.path().join("nope.json"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("Recipe not found"));
}

#[test]
fn build_refuses_template_recipe() {
  let fixture = Fixture::new("template");

  fixture
    .build()
    .assert()
    .failure()
    .stderr(predicate::str::contains("template"));

  assert!(!fixture.path("catalogs").exists());
}

#[test]
fn build_without_stage_sources_fails() {
  let fixture = Fixture::new("instance");

  samcat_cmd()
    .arg("build")
    .arg("--recipe")
    .arg(fixture.path("recipe.json"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("stage definitions"));
}

#[test]
fn dry_run_build_writes_catalog() {
  let fixture = Fixture::new("instance");

  fixture
    .build()
    .assert()
    .success()
    .stdout(predicate::str::contains("Wrote"))
    .stdout(predicate::str::contains("Dry run"))
    .stderr(predicate::str::contains("bnb_missing"));

  let catalog_path = fixture.only_catalog();
  let name = catalog_path.file_name().unwrap().to_string_lossy().to_string();
  assert!(name.starts_with("smoke.bnb.all.catalog.v"), "{}", name);

  let catalog = read_json(&catalog_path);
  assert_eq!(catalog["role"], "catalog");
  let samples = catalog["samples"]["run_configurations"]["bnb_data"]["run1"]["samples"]
    .as_array()
    .unwrap();
  assert_eq!(samples.len(), 1);
  assert_eq!(samples[0]["dataset_id"], "bnb.data.r1.mc.inc.sel-beam");
  assert!(samples[0].get("do_hadd").is_none());

  // Dry run never creates merged artifacts.
  assert!(!fixture.path("ntuples").exists());
}

#[test]
fn build_json_output_reports_skips() {
  let fixture = Fixture::new("instance");

  let output = fixture.build().arg("--output").arg("json").assert().success();
  let report: serde_json::Value = serde_json::from_slice(&output.get_output().stdout).unwrap();

  assert_eq!(report["dry_run"], true);
  assert_eq!(report["report"]["processed"], 1);
  assert_eq!(report["report"]["skipped"][0]["sample_key"], "bnb_missing");
  assert_eq!(report["report"]["skipped"][0]["reason"], "stage_not_found");
  assert_eq!(report["summary"]["samples"], 1);
}

#[test]
fn rebuild_is_accepted() {
  let fixture = Fixture::new("instance");

  fixture.build().assert().success();
  fixture.build().assert().success();
}

// =============================================================================
// stages
// =============================================================================

#[test]
fn stages_prints_map() {
  let fixture = Fixture::new("instance");

  samcat_cmd()
    .arg("stages")
    .arg("--stages")
    .arg(fixture.path("stages.json"))
    .assert()
    .success()
    .stdout(predicate::str::contains("selection_beam"))
    .stdout(predicate::str::contains("1 stage(s)"));
}

#[test]
fn stages_reads_workflow_xml_from_env() {
  let temp = TempDir::new().unwrap();
  let xml = temp.path().join("wf.xml");
  std::fs::write(
    &xml,
    r#"<!DOCTYPE project [ <!ENTITY top "/pnfs/ana"> ]>
<project name="p"><stage name="selection_ext"><outdir>&top;/ext</outdir></stage></project>"#,
  )
  .unwrap();

  samcat_cmd()
    .arg("stages")
    .arg("--output")
    .arg("json")
    .env("SAMCAT_WORKFLOW_XML", &xml)
    .assert()
    .success()
    .stdout(predicate::str::contains("\"selection_ext\": \"/pnfs/ana/ext\""));
}

// =============================================================================
// show
// =============================================================================

#[test]
fn show_summarizes_built_catalog() {
  let fixture = Fixture::new("instance");
  fixture.build().assert().success();
  let catalog_path = fixture.only_catalog();

  samcat_cmd()
    .arg("show")
    .arg(&catalog_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("bnb_data"))
    .stdout(predicate::str::contains("Samples: 1"));

  let output = samcat_cmd()
    .arg("show")
    .arg(&catalog_path)
    .arg("--output")
    .arg("json")
    .assert()
    .success();
  let summary: serde_json::Value = serde_json::from_slice(&output.get_output().stdout).unwrap();
  assert_eq!(summary["summary"]["beams"], 1);
  assert_eq!(summary["summary"]["runs"], 1);
}

#[test]
fn show_fails_for_missing_catalog() {
  samcat_cmd()
    .arg("show")
    .arg("/nonexistent/catalog.json")
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to load catalog"));
}
