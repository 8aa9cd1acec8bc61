//! The external data-info script.
//!
//! The script takes a file of `run subrun` lines and prints a whitespace
//! table: a header line naming the columns, then a line of values. NuMI
//! output may additionally break totals down per horn polarity on lines
//! starting with `Forward Horn Current:` / `Reverse Horn Current:`.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use super::ExposureError;
use super::source::ExposureTotals;
use crate::recipe::{BeamFamily, BeamKey, HornCurrent, SampleType};
use crate::util::process::run_captured;

static NUMBER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"[-+]?\d+\.?\d*(?:[eE][-+]?\d+)?").expect("number pattern"));

/// Output layout per beam family.
struct Format {
  flag: &'static str,
  pot_header: &'static [&'static str],
  trigger_header: &'static [&'static str],
  pot_fields: &'static [&'static str],
}

const NUMI: Format = Format {
  flag: "--format-numi",
  pot_header: &["EXT", "Gate1", "tortgt_wcut"],
  trigger_header: &["EXT", "Gate1"],
  pot_fields: &["tortgt_wcut", "tor101_wcut", "tortgt", "tor101"],
};

const BNB: Format = Format {
  flag: "--format-bnb",
  pot_header: &["EXT", "Gate2", "tor875_wcut"],
  trigger_header: &["EXT", "Gate2"],
  pot_fields: &["tor875_wcut", "tor860_wcut", "tor875", "tor860"],
};

fn format_for(family: BeamFamily) -> &'static Format {
  match family {
    BeamFamily::Numi => &NUMI,
    BeamFamily::Bnb => &BNB,
  }
}

/// How to invoke the data-info script.
#[derive(Debug, Clone)]
pub struct DataInfoScript {
  pub script: PathBuf,
  /// Interpreter to run the script with; the script is executed directly if unset.
  pub interpreter: Option<String>,
  pub timeout: Option<Duration>,
}

impl DataInfoScript {
  pub fn new(script: impl Into<PathBuf>) -> Self {
    Self {
      script: script.into(),
      interpreter: None,
      timeout: None,
    }
  }

  pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  /// Query exposure (prescaled run) and beam-off triggers (unprescaled run).
  ///
  /// Values the output does not contain come back as zero.
  pub fn query(
    &self,
    pairs: &BTreeSet<(u64, u64)>,
    beam: &BeamKey,
    sample_type: &SampleType,
  ) -> Result<ExposureTotals, ExposureError> {
    let family = beam
      .family()
      .ok_or_else(|| ExposureError::Script(format!("unknown beam type '{}'", beam.key)))?;
    let format = format_for(family);

    let mut list = tempfile::NamedTempFile::new().map_err(|source| ExposureError::Read {
      path: std::env::temp_dir(),
      source,
    })?;
    for (run, subrun) in pairs {
      writeln!(list, "{} {}", run, subrun).map_err(|source| ExposureError::Read {
        path: list.path().to_path_buf(),
        source,
      })?;
    }
    list.flush().map_err(|source| ExposureError::Read {
      path: list.path().to_path_buf(),
      source,
    })?;

    let mut pot_args = vec![format.flag.to_string(), "--prescale".to_string()];
    pot_args.push("--run-subrun-list".to_string());
    pot_args.push(list.path().display().to_string());
    if family == BeamFamily::Numi {
      pot_args.push("--horncurr".to_string());
    }
    if *sample_type == SampleType::Data {
      pot_args.push("--slip".to_string());
    }
    let pot_output = self.run(&pot_args)?;
    let pot = parse_pot(&pot_output, family, beam.horn_current()).unwrap_or_else(|| {
      warn!(beam = %beam.key, "no exposure column in data info output");
      0.0
    });

    let trigger_args = vec![
      format.flag.to_string(),
      "--run-subrun-list".to_string(),
      list.path().display().to_string(),
    ];
    let trigger_output = self.run(&trigger_args)?;
    let triggers = parse_ext_triggers(&trigger_output, family).unwrap_or_else(|| {
      warn!(beam = %beam.key, "no EXT column in data info output");
      0
    });

    Ok(ExposureTotals { pot, triggers })
  }

  fn run(&self, args: &[String]) -> Result<String, ExposureError> {
    let mut command = match &self.interpreter {
      Some(interpreter) => {
        let mut command = Command::new(interpreter);
        command.arg(&self.script);
        command
      }
      None => Command::new(&self.script),
    };
    command
      .arg("-v3")
      .args(args)
      .env_remove("PYTHONHOME")
      .env_remove("PYTHONPATH");

    info!(script = %self.script.display(), args = %args.join(" "), "running data info script");
    let output = run_captured(command, self.timeout)?;
    if !output.status.success() {
      debug!(stderr = %output.stderr.trim(), "data info stderr");
      return Err(ExposureError::Script(format!(
        "{} exited with {}",
        self.script.display(),
        output.status
      )));
    }
    Ok(output.stdout)
  }
}

fn find_header(lines: &[&str], keys: &[&str]) -> Option<usize> {
  lines.iter().position(|line| keys.iter().all(|key| line.contains(key)))
}

/// Exposure from a prescaled data-info table.
///
/// The first POT column present in the header wins. For NuMI with a known
/// horn polarity, values come from that polarity's line when there is one.
pub fn parse_pot(output: &str, family: BeamFamily, horn: Option<HornCurrent>) -> Option<f64> {
  let format = format_for(family);
  let lines: Vec<&str> = output.trim().lines().collect();
  let header_index = find_header(&lines, format.pot_header)?;
  let header: Vec<&str> = lines[header_index].split_whitespace().collect();

  let polarity_line = match (family, horn) {
    (BeamFamily::Numi, Some(horn)) => {
      let prefix = match horn {
        HornCurrent::Forward => "Forward Horn Current:",
        HornCurrent::Reverse => "Reverse Horn Current:",
      };
      lines[header_index + 1..]
        .iter()
        .find(|line| line.trim().starts_with(prefix))
        .copied()
    }
    _ => None,
  };

  let values: Vec<&str> = match polarity_line {
    Some(line) => NUMBER.find_iter(line).map(|m| m.as_str()).collect(),
    None => lines.get(header_index + 1)?.split_whitespace().collect(),
  };

  let field = format.pot_fields.iter().find(|field| header.contains(*field))?;
  let index = header.iter().position(|column| column == field)?;
  values.get(index)?.parse::<f64>().ok()
}

/// Beam-off trigger count from an unprescaled data-info table.
pub fn parse_ext_triggers(output: &str, family: BeamFamily) -> Option<u64> {
  let format = format_for(family);
  let lines: Vec<&str> = output.trim().lines().collect();
  let header_index = find_header(&lines, format.trigger_header)?;
  let header: Vec<&str> = lines[header_index].split_whitespace().collect();
  let values: Vec<&str> = lines.get(header_index + 1)?.split_whitespace().collect();

  let index = header.iter().position(|column| *column == "EXT")?;
  let value = values.get(index)?.parse::<f64>().ok()?;
  Some(value as u64)
}
