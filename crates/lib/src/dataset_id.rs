//! Canonical dataset identifiers.
//!
//! An id is the dot-joined tuple
//! `beamline.mode.run.origin.subset.stage[.variation]`, e.g.
//! `numi.fhc.r1.mc.inc.sel-beam` or `numi.fhc.r1.mc.inc.sel-beam.wiremod_x`.
//! Everything here is pure.

use std::fmt;

const DELIMITER: &str = ".";
const RUN_MARKER: &str = "r";

/// Short tokens for well-known stages; other stage names are used verbatim.
const STAGE_TOKENS: &[(&str, &str)] = &[
  ("selection_beam", "sel-beam"),
  ("selection_ext", "sel-ext"),
  ("selection_strangeness", "sel-strange"),
  ("selection_dirt", "sel-dirt"),
];

/// Physics subset a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
  Strange,
  Dirt,
  Inclusive,
}

impl Subset {
  /// Infer from the sample key and declared origin; first match wins.
  pub fn infer(sample_key: &str, origin: &str) -> Self {
    let key = sample_key.to_lowercase();
    if key.contains("strange") {
      Subset::Strange
    } else if key.contains("dirt") || origin == "dirt" {
      Subset::Dirt
    } else {
      Subset::Inclusive
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Subset::Strange => "strange",
      Subset::Dirt => "dirt",
      Subset::Inclusive => "inc",
    }
  }
}

impl fmt::Display for Subset {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// `run1` -> `r1`, `Run 12a` -> `r12`.
///
/// A name without any digit is returned unchanged; collapsing it to a bare
/// marker would give every digitless run the same token.
pub fn normalize_run(run: &str) -> String {
  let digits: String = run.chars().filter(|c| c.is_ascii_digit()).collect();
  if digits.is_empty() {
    run.to_string()
  } else {
    format!("{}{}", RUN_MARKER, digits)
  }
}

pub fn stage_token(stage_name: &str) -> &str {
  STAGE_TOKENS
    .iter()
    .find(|(name, _)| *name == stage_name)
    .map(|(_, token)| *token)
    .unwrap_or(stage_name)
}

/// The fields a dataset id is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetIdParts<'a> {
  pub beamline: &'a str,
  pub mode: &'a str,
  pub run: &'a str,
  pub origin: &'a str,
  pub subset: Subset,
  pub stage_name: &'a str,
  pub variation: Option<&'a str>,
}

impl<'a> DatasetIdParts<'a> {
  /// Same sample under a detector variation.
  pub fn with_variation(self, variation: Option<&'a str>) -> Self {
    Self { variation, ..self }
  }

  pub fn make_id(&self) -> String {
    let run = normalize_run(self.run);
    let mut parts = vec![
      self.beamline,
      self.mode,
      run.as_str(),
      self.origin,
      self.subset.as_str(),
      stage_token(self.stage_name),
    ];
    if let Some(variation) = self.variation.filter(|v| !v.is_empty()) {
      parts.push(variation);
    }
    parts.join(DELIMITER)
  }
}
