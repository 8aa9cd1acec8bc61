//! Per-file exposure memo keyed by path and modification time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

/// Memoized per-file exposure values.
///
/// Keyed by `(path, mtime)`, so a rewritten file misses the cache. Only
/// successful reads are stored.
#[derive(Debug, Default)]
pub struct ExposureCache {
  entries: Mutex<HashMap<(PathBuf, SystemTime), f64>>,
}

impl ExposureCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, path: &Path, modified: SystemTime) -> Option<f64> {
    let entries = match self.entries.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    entries.get(&(path.to_path_buf(), modified)).copied()
  }

  /// Store `value` unless another reader got there first; returns the stored value.
  pub fn insert(&self, path: &Path, modified: SystemTime, value: f64) -> f64 {
    let mut entries = match self.entries.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    *entries.entry((path.to_path_buf(), modified)).or_insert(value)
  }

  pub fn len(&self) -> usize {
    match self.entries.lock() {
      Ok(guard) => guard.len(),
      Err(poisoned) => poisoned.into_inner().len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
