//! Beam key interpretation.
//!
//! Beam keys are free-form strings such as `bnb`, `numi_fhc` or `numi_ext`.
//! Everything here is substring matching on those keys; the matching rules
//! are kept as-is for compatibility with existing recipes.

/// A beam key split into beamline and mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeamKey {
  pub key: String,
  pub beamline: String,
  pub mode: String,
}

/// Accelerator family a beam key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeamFamily {
  Bnb,
  Numi,
}

/// NuMI horn polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HornCurrent {
  Forward,
  Reverse,
}

impl BeamKey {
  /// Split `beamline_mode`; a key without `_` is on-beam `data`.
  ///
  /// `bnb` -> (`bnb`, `data`), `bnb_ext` -> (`bnb`, `ext`), `numi_fhc` -> (`numi`, `fhc`).
  pub fn parse(key: &str) -> Self {
    let (beamline, mode) = match key.split_once('_') {
      Some((beamline, mode)) => (beamline, mode),
      None => (key, "data"),
    };
    Self {
      key: key.to_string(),
      beamline: beamline.to_string(),
      mode: mode.to_string(),
    }
  }

  /// Beam-off (EXT) running.
  pub fn is_off_beam(&self) -> bool {
    self.mode == "ext" || self.key.ends_with("_ext")
  }

  pub fn family(&self) -> Option<BeamFamily> {
    let lower = self.key.to_lowercase();
    if lower.contains("numi") {
      Some(BeamFamily::Numi)
    } else if lower.contains("bnb") {
      Some(BeamFamily::Bnb)
    } else {
      None
    }
  }

  pub fn horn_current(&self) -> Option<HornCurrent> {
    let lower = self.key.to_lowercase();
    if lower.contains("fhc") {
      Some(HornCurrent::Forward)
    } else if lower.contains("rhc") {
      Some(HornCurrent::Reverse)
    } else {
      None
    }
  }
}
