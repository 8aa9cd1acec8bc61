//! Artifact discovery under stage output directories.
//!
//! Listings are memoized per directory for the lifetime of one
//! [`FileDiscovery`], which the catalog builder creates per build. A build is a
//! single point-in-time snapshot of the filesystem, so entries are never
//! invalidated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::consts::ARTIFACT_EXTENSION;

/// Cached, sorted artifact listings keyed by directory.
#[derive(Debug, Default)]
pub struct FileDiscovery {
  cache: RwLock<HashMap<PathBuf, Arc<Vec<PathBuf>>>>,
}

impl FileDiscovery {
  pub fn new() -> Self {
    Self::default()
  }

  /// All artifact files below `dir`, recursively, in lexicographic order.
  ///
  /// A missing directory yields an empty listing. Concurrent first calls
  /// for the same directory may both walk it; the first inserted listing wins.
  pub fn list_artifacts(&self, dir: &Path) -> Arc<Vec<PathBuf>> {
    if let Some(hit) = self.cached(dir) {
      debug!(dir = %dir.display(), files = hit.len(), "discovery cache hit");
      return hit;
    }

    let listing = Arc::new(scan_artifacts(dir));

    let mut cache = match self.cache.write() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    cache.entry(dir.to_path_buf()).or_insert(listing).clone()
  }

  /// Number of directories listed so far.
  pub fn cached_dirs(&self) -> usize {
    match self.cache.read() {
      Ok(guard) => guard.len(),
      Err(poisoned) => poisoned.into_inner().len(),
    }
  }

  fn cached(&self, dir: &Path) -> Option<Arc<Vec<PathBuf>>> {
    let cache = match self.cache.read() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    cache.get(dir).cloned()
  }
}

fn scan_artifacts(dir: &Path) -> Vec<PathBuf> {
  let mut files = Vec::new();

  for entry in WalkDir::new(dir).follow_links(true) {
    let entry = match entry {
      Ok(entry) => entry,
      Err(e) => {
        // A missing root is the common case for stages that never ran.
        if e.depth() > 0 {
          warn!(dir = %dir.display(), error = %e, "skipping unreadable entry");
        }
        continue;
      }
    };
    if !entry.file_type().is_file() {
      continue;
    }
    let is_artifact = entry
      .path()
      .extension()
      .is_some_and(|ext| ext == ARTIFACT_EXTENSION);
    if is_artifact {
      files.push(entry.into_path());
    }
  }

  files.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
  debug!(dir = %dir.display(), files = files.len(), "scanned artifacts");
  files
}
