//! Build configuration.
//!
//! Defaults come from [`crate::consts`]; [`BuildConfig::from_env`] layers the
//! `SAMCAT_*` environment variables on top, and the CLI layers its flags on
//! top of that.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::consts::{
  DEFAULT_MERGE_TIMEOUT_SECS, DEFAULT_MERGE_TOOL, DEFAULT_READER_COMMAND, DEFAULT_READER_TIMEOUT_SECS,
  MAX_DEFAULT_JOBS,
};
use crate::exposure::{DataInfoScript, ExposureError, ExposureSource, JsonTriggerTable, SummaryTable};

pub const ENV_MERGE_TOOL: &str = "SAMCAT_MERGE_TOOL";
pub const ENV_READER: &str = "SAMCAT_READER";
pub const ENV_JOBS: &str = "SAMCAT_JOBS";
pub const ENV_WORKFLOW_XML: &str = "SAMCAT_WORKFLOW_XML";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid value '{value}' for {var}")]
  InvalidEnv { var: &'static str, value: String },

  #[error("unknown exposure source '{0}' (expected per-file-sum, external-script, trigger-db or summary-lookup)")]
  UnknownExposureSource(String),

  #[error("exposure source '{0}' needs an input path")]
  MissingExposureInput(&'static str),

  #[error(transparent)]
  Exposure(#[from] ExposureError),
}

/// Which [`ExposureSource`] variant to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExposureSourceKind {
  #[default]
  PerFileSum,
  ExternalScript,
  TriggerDb,
  SummaryLookup,
}

impl ExposureSourceKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ExposureSourceKind::PerFileSum => "per-file-sum",
      ExposureSourceKind::ExternalScript => "external-script",
      ExposureSourceKind::TriggerDb => "trigger-db",
      ExposureSourceKind::SummaryLookup => "summary-lookup",
    }
  }
}

impl FromStr for ExposureSourceKind {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "per-file-sum" => Ok(ExposureSourceKind::PerFileSum),
      "external-script" => Ok(ExposureSourceKind::ExternalScript),
      "trigger-db" => Ok(ExposureSourceKind::TriggerDb),
      "summary-lookup" => Ok(ExposureSourceKind::SummaryLookup),
      other => Err(ConfigError::UnknownExposureSource(other.to_string())),
    }
  }
}

/// Selected exposure source and its input (script path or JSON table).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExposureSourceConfig {
  pub kind: ExposureSourceKind,
  pub input: Option<PathBuf>,
}

impl ExposureSourceConfig {
  /// Load tables and resolve the script for the selected source.
  pub fn build(&self, script_timeout: Option<Duration>) -> Result<ExposureSource, ConfigError> {
    let input = || {
      self
        .input
        .as_deref()
        .ok_or(ConfigError::MissingExposureInput(self.kind.as_str()))
    };
    Ok(match self.kind {
      ExposureSourceKind::PerFileSum => ExposureSource::PerFileSum,
      ExposureSourceKind::ExternalScript => {
        ExposureSource::ExternalScript(Arc::new(DataInfoScript::new(input()?).with_timeout(script_timeout)))
      }
      ExposureSourceKind::TriggerDb => ExposureSource::TriggerDb(Arc::new(JsonTriggerTable::load(input()?)?)),
      ExposureSourceKind::SummaryLookup => ExposureSource::SummaryLookup(Arc::new(SummaryTable::load(input()?)?)),
    })
  }
}

/// Everything a catalog build needs besides the recipe and stage map.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
  /// Overrides the recipe's project slug.
  pub project: Option<String>,
  /// Runs to process; empty means all.
  pub runs: Vec<String>,
  pub outdir: PathBuf,
  /// Concurrency cap for per-file reads.
  pub jobs: usize,
  pub merge_tool: String,
  pub reader: String,
  /// Never execute merges, whatever the entries request.
  pub dry_run: bool,
  /// Overwrite an existing catalog with a different sample tree.
  pub force: bool,
  pub merge_timeout: Option<Duration>,
  pub reader_timeout: Option<Duration>,
  pub exposure: ExposureSourceConfig,
  /// Workflow definitions to resolve stages from when none are given explicitly.
  pub workflow_xml: Vec<PathBuf>,
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      project: None,
      runs: Vec::new(),
      outdir: PathBuf::from("catalogs"),
      jobs: default_jobs(),
      merge_tool: DEFAULT_MERGE_TOOL.to_string(),
      reader: DEFAULT_READER_COMMAND.to_string(),
      dry_run: false,
      force: false,
      merge_timeout: Some(Duration::from_secs(DEFAULT_MERGE_TIMEOUT_SECS)),
      reader_timeout: Some(Duration::from_secs(DEFAULT_READER_TIMEOUT_SECS)),
      exposure: ExposureSourceConfig::default(),
      workflow_xml: Vec::new(),
    }
  }
}

impl BuildConfig {
  /// Defaults with `SAMCAT_*` environment overrides applied.
  pub fn from_env() -> Result<Self, ConfigError> {
    let mut config = Self::default();

    if let Some(tool) = env_non_empty(ENV_MERGE_TOOL) {
      config.merge_tool = tool;
    }
    if let Some(reader) = env_non_empty(ENV_READER) {
      config.reader = reader;
    }
    if let Some(jobs) = env_non_empty(ENV_JOBS) {
      config.jobs = match jobs.parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => {
          return Err(ConfigError::InvalidEnv {
            var: ENV_JOBS,
            value: jobs,
          });
        }
      };
    }
    if let Some(paths) = std::env::var_os(ENV_WORKFLOW_XML) {
      config.workflow_xml = std::env::split_paths(&paths)
        .filter(|p| !p.as_os_str().is_empty())
        .collect();
    }

    Ok(config)
  }
}

/// `run1, run2,,` -> `["run1", "run2"]`.
pub fn parse_runs(list: &str) -> Vec<String> {
  list
    .split(',')
    .map(str::trim)
    .filter(|r| !r.is_empty())
    .map(String::from)
    .collect()
}

fn env_non_empty(var: &str) -> Option<String> {
  std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn default_jobs() -> usize {
  std::thread::available_parallelism()
    .map(|p| p.get())
    .unwrap_or(1)
    .min(MAX_DEFAULT_JOBS)
}
