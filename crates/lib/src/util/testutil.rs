//! Test utilities for samcat-lib.
//!
//! Stand-ins for the external collaborators: a column reader answering from
//! a table, and executable shell scripts posing as the merge tool or reader.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::exposure::{ColumnReader, ExposureError};

/// Merge tool body: `<tool> -f <out> <inputs...>` concatenates the inputs.
pub const CONCAT_MERGE: &str = r#"out="$2"; shift 2; cat "$@" > "$out""#;

/// Column reader keyed by file name.
///
/// `pot` answers any tree; `run`/`subRun` answer every tree. Anything else is
/// not found.
#[derive(Debug, Default)]
pub struct FakeReader {
  pot: HashMap<String, f64>,
  runs: HashMap<String, (Vec<f64>, Vec<f64>)>,
  calls: AtomicUsize,
}

impl FakeReader {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_pot(mut self, file_name: &str, pot: f64) -> Self {
    self.pot.insert(file_name.to_string(), pot);
    self
  }

  pub fn with_runs(mut self, file_name: &str, runs: &[u64], subruns: &[u64]) -> Self {
    self.runs.insert(
      file_name.to_string(),
      (
        runs.iter().map(|r| *r as f64).collect(),
        subruns.iter().map(|s| *s as f64).collect(),
      ),
    );
    self
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl ColumnReader for FakeReader {
  fn read_branch(&self, path: &Path, tree: &str, branch: &str) -> Result<Vec<f64>, ExposureError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    let found = match branch {
      "pot" => self.pot.get(&name).map(|v| vec![*v]),
      "run" => self.runs.get(&name).map(|(r, _)| r.clone()),
      "subRun" => self.runs.get(&name).map(|(_, s)| s.clone()),
      _ => None,
    };
    found.ok_or_else(|| ExposureError::NotFound {
      path: path.to_path_buf(),
      tree: tree.to_string(),
      branch: branch.to_string(),
    })
  }
}

/// Create a file holding its own relative name (and its parents).
pub fn touch(dir: &Path, relative: &str) -> PathBuf {
  let path = dir.join(relative);
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(&path, relative.as_bytes()).unwrap();
  path
}

/// Write an executable `/bin/sh` script.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join(name);
  std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  path
}
