//! Catalog naming and emission.

use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use tracing::{info, warn};

use super::CatalogError;
use super::types::Catalog;
use crate::dataset_id::normalize_run;

/// Components of a catalog file name:
/// `<project>.<beam_scope>.<runs>.catalog.<version>-g<hash>.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogName {
  pub project: String,
  pub beam_scope: String,
  pub runs_token: String,
  pub version_tag: String,
  pub recipe_hash: String,
}

impl CatalogName {
  pub fn file_name(&self) -> String {
    self.to_string()
  }
}

impl fmt::Display for CatalogName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}.{}.{}.catalog.{}-g{}.json",
      self.project, self.beam_scope, self.runs_token, self.version_tag, self.recipe_hash
    )
  }
}

/// `v<YYYYMMDD>` in UTC.
pub fn version_tag(now: DateTime<Utc>) -> String {
  now.format("v%Y%m%d").to_string()
}

/// Label for the set of beams present in a catalog.
///
/// BNB and NuMI together -> `nu+bnb`; only BNB -> `bnb`; only NuMI ->
/// `nu[<polarities>]`; anything else -> `multi`.
pub fn summarize_beams<'a>(beam_keys: impl IntoIterator<Item = &'a str>) -> String {
  let beams: BTreeSet<&str> = beam_keys.into_iter().collect();
  let has_bnb = beams.iter().any(|k| k.starts_with("bnb"));
  let has_numi = beams.iter().any(|k| k.starts_with("numi"));

  match (has_bnb, has_numi) {
    (true, true) => "nu+bnb".to_string(),
    (true, false) => "bnb".to_string(),
    (false, true) => {
      let polarities: BTreeSet<&str> = beams
        .iter()
        .filter(|k| **k != "numi_ext")
        .filter_map(|k| k.split_once('_').map(|(_, pol)| pol))
        .collect();
      if polarities.is_empty() {
        "nu".to_string()
      } else {
        format!("nu[{}]", polarities.into_iter().collect::<Vec<_>>().join(","))
      }
    }
    (false, false) => "multi".to_string(),
  }
}

/// Label for the selected runs: `all`, `r1`, `r1-r3` or `r1,r3`.
pub fn runset_token(runs: &[String]) -> String {
  match runs {
    [] => "all".to_string(),
    [single] => normalize_run(single),
    _ => {
      let numbers: Option<Vec<u64>> = runs
        .iter()
        .map(|r| r.chars().filter(|c| c.is_ascii_digit()).collect::<String>().parse().ok())
        .collect();
      if let Some(mut numbers) = numbers {
        numbers.sort_unstable();
        let first = numbers[0];
        let last = numbers[numbers.len() - 1];
        let contiguous = numbers.iter().enumerate().all(|(i, n)| *n == first + i as u64);
        if contiguous {
          return format!("r{}-r{}", first, last);
        }
      }
      runs.iter().map(|r| normalize_run(r)).collect::<Vec<_>>().join(",")
    }
  }
}

/// Writes catalogs into one output directory.
#[derive(Debug, Clone)]
pub struct CatalogWriter {
  outdir: PathBuf,
  force: bool,
}

impl CatalogWriter {
  pub fn new(outdir: impl Into<PathBuf>, force: bool) -> Self {
    Self {
      outdir: outdir.into(),
      force,
    }
  }

  pub fn outdir(&self) -> &Path {
    &self.outdir
  }

  /// Write `catalog` as `<outdir>/<name>`, four-space indented.
  ///
  /// An existing file with an identical sample tree is rewritten; one with a
  /// different tree is a [`CatalogError::Conflict`] unless forced.
  pub fn write(&self, catalog: &Catalog, name: &CatalogName) -> Result<PathBuf, CatalogError> {
    std::fs::create_dir_all(&self.outdir).map_err(|source| CatalogError::Write {
      path: self.outdir.clone(),
      source,
    })?;

    let path = self.outdir.join(name.file_name());
    if path.exists() {
      self.check_existing(&path, catalog)?;
    }

    let bytes = to_pretty_json(catalog)?;
    let mut staged = tempfile::NamedTempFile::new_in(&self.outdir).map_err(|source| CatalogError::Write {
      path: self.outdir.clone(),
      source,
    })?;
    staged.write_all(&bytes).map_err(|source| CatalogError::Write {
      path: staged.path().to_path_buf(),
      source,
    })?;
    staged.persist(&path).map_err(|e| CatalogError::Write {
      path: path.clone(),
      source: e.error,
    })?;

    info!(path = %path.display(), "wrote catalog");
    Ok(path)
  }

  fn check_existing(&self, path: &Path, catalog: &Catalog) -> Result<(), CatalogError> {
    let same = match Catalog::load(path) {
      Ok(existing) => existing.samples == catalog.samples,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "existing catalog is unreadable");
        false
      }
    };

    if same {
      info!(path = %path.display(), "existing catalog has an identical sample tree, rewriting");
      Ok(())
    } else if self.force {
      warn!(path = %path.display(), "overwriting catalog with a different sample tree");
      Ok(())
    } else {
      Err(CatalogError::Conflict { path: path.to_path_buf() })
    }
  }
}

/// Serialize with four-space indentation.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>, CatalogError> {
  let mut buf = Vec::new();
  let formatter = PrettyFormatter::with_indent(b"    ");
  let mut serializer = Serializer::with_formatter(&mut buf, formatter);
  value.serialize(&mut serializer).map_err(CatalogError::Serialize)?;
  Ok(buf)
}
