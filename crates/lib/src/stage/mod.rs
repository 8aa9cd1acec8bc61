//! Stage name to output directory resolution.
//!
//! The map is assembled once per catalog build (from workflow XML or a JSON
//! file) and shared read-only by every sample.

mod workflow;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use workflow::{WorkflowDefinition, declare_entities, parse_workflow, substitute_entities};

/// Errors that can occur while loading stage definitions.
#[derive(Debug, Error)]
pub enum StageError {
  #[error("failed to read stage definitions {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse stage map {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("no stage definitions given; pass workflow XML or a stage map")]
  NoSources,
}

/// Mapping from stage name to its entity-substituted output directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageOutdirMap(BTreeMap<String, String>);

impl StageOutdirMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, stage: impl Into<String>, outdir: impl Into<String>) {
    self.0.insert(stage.into(), outdir.into());
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
    self.0.iter()
  }

  /// Output directory of `stage`, if defined.
  ///
  /// Absence is not an error here; the caller decides what a missing stage means.
  pub fn resolve(&self, stage: &str) -> Option<&Path> {
    self
      .0
      .get(stage)
      .map(String::as_str)
      .filter(|dir| !dir.is_empty())
      .map(Path::new)
  }

  /// Load a `{ "stage": "/out/dir" }` JSON file.
  pub fn from_json_file(path: &Path) -> Result<Self, StageError> {
    let content = fs::read_to_string(path).map_err(|source| StageError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_str(&content).map_err(|source| StageError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Collect stage output directories from workflow XML files.
  ///
  /// Entities from every file form one declaration-ordered set, applied
  /// after all files are read, so any file may use an entity declared in
  /// another. Later files override earlier definitions of the same stage.
  pub fn from_workflow_files(paths: &[PathBuf]) -> Result<Self, StageError> {
    let mut entities = Vec::new();
    let mut raw = BTreeMap::new();

    for path in paths {
      let text = fs::read_to_string(path).map_err(|source| StageError::Read {
        path: path.clone(),
        source,
      })?;
      let definition = parse_workflow(&text, path);
      declare_entities(&mut entities, definition.entities);
      raw.extend(definition.stage_outdirs);
    }

    Ok(
      raw
        .into_iter()
        .map(|(stage, raw_outdir)| {
          let outdir = substitute_entities(&raw_outdir, &entities);
          debug!(stage = %stage, outdir = %outdir, "resolved stage outdir");
          (stage, outdir)
        })
        .collect(),
    )
  }

  /// Combine workflow XML files and JSON maps; JSON entries win.
  pub fn load(xml_paths: &[PathBuf], json_paths: &[PathBuf]) -> Result<Self, StageError> {
    if xml_paths.is_empty() && json_paths.is_empty() {
      return Err(StageError::NoSources);
    }
    let mut map = Self::from_workflow_files(xml_paths)?;
    for path in json_paths {
      map.0.extend(Self::from_json_file(path)?.0);
    }
    Ok(map)
  }
}

impl FromIterator<(String, String)> for StageOutdirMap {
  fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
    Self(iter.into_iter().collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn resolve_known_and_unknown() {
    let mut map = StageOutdirMap::new();
    map.insert("selection_beam", "/pnfs/out/beam");
    assert_eq!(map.resolve("selection_beam"), Some(Path::new("/pnfs/out/beam")));
    assert_eq!(map.resolve("selection_ext"), None);
  }

  #[test]
  fn empty_outdir_resolves_to_none() {
    let mut map = StageOutdirMap::new();
    map.insert("broken", "");
    assert_eq!(map.resolve("broken"), None);
  }

  #[test]
  fn json_map_loads() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("stages.json");
    fs::write(&path, r#"{ "selection_beam": "/a", "selection_ext": "/b" }"#).unwrap();
    let map = StageOutdirMap::from_json_file(&path).unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map.resolve("selection_ext"), Some(Path::new("/b")));
  }

  #[test]
  fn entities_carry_across_files_and_later_stages_win() {
    let temp = tempdir().unwrap();
    let core = temp.path().join("core.xml");
    let detvar = temp.path().join("detvar.xml");
    fs::write(
      &core,
      r#"<?xml version="1.0"?>
<!DOCTYPE project [
<!ENTITY user "nlane">
<!ENTITY base "/pnfs/uboone/scratch/users/&user;">
]>
<job>
<project name="core">
  <stage name="selection_beam"><outdir>/pnfs/base/beam</outdir></stage>
  <stage name="selection_ext"><outdir>/pnfs/&user;/ext</outdir></stage>
</project>
</job>"#,
    )
    .unwrap();
    fs::write(
      &detvar,
      r#"<job>
<project name="detvar">
  <stage name="selection_beam"><outdir>/pnfs/&user;/beam_v2</outdir></stage>
  <stage name="detvar_cv"><outdir>/pnfs/&user;/cv</outdir></stage>
</project>
</job>"#,
    )
    .unwrap();

    let map = StageOutdirMap::from_workflow_files(&[core, detvar]).unwrap();
    assert_eq!(map.resolve("selection_ext"), Some(Path::new("/pnfs/nlane/ext")));
    assert_eq!(map.resolve("selection_beam"), Some(Path::new("/pnfs/nlane/beam_v2")));
    assert_eq!(map.resolve("detvar_cv"), Some(Path::new("/pnfs/nlane/cv")));
  }

  #[test]
  fn entity_declared_in_later_file_resolves() {
    let temp = tempdir().unwrap();
    let core = temp.path().join("core.xml");
    let defs = temp.path().join("defs.xml");
    fs::write(
      &core,
      r#"<job><project name="core"><stage name="selection_beam"><outdir>&base;/beam</outdir></stage></project></job>"#,
    )
    .unwrap();
    fs::write(&defs, r#"<!DOCTYPE project [ <!ENTITY base "/pnfs/x"> ]><job></job>"#).unwrap();

    let map = StageOutdirMap::from_workflow_files(&[core, defs]).unwrap();
    assert_eq!(map.resolve("selection_beam"), Some(Path::new("/pnfs/x/beam")));
  }

  #[test]
  fn load_requires_a_source() {
    assert!(matches!(StageOutdirMap::load(&[], &[]), Err(StageError::NoSources)));
  }

  #[test]
  fn json_overrides_xml() {
    let temp = tempdir().unwrap();
    let xml = temp.path().join("wf.xml");
    let json = temp.path().join("stages.json");
    fs::write(
      &xml,
      r#"<job><project name="p"><stage name="s"><outdir>/from/xml</outdir></stage></project></job>"#,
    )
    .unwrap();
    fs::write(&json, r#"{ "s": "/from/json" }"#).unwrap();
    let map = StageOutdirMap::load(&[xml], &[json]).unwrap();
    assert_eq!(map.resolve("s"), Some(Path::new("/from/json")));
  }
}
