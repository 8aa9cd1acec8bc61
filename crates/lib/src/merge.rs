//! External merge tool invocation.
//!
//! The merge tool concatenates many per-job files into one artifact:
//! `<tool> -f <destination> <sources...>`. With `-f` the destination is
//! overwritten, so re-running with the same sources reproduces the artifact.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// What a merge call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
  /// The tool ran and wrote the destination.
  Merged,
  /// Execution disabled; nothing was written. Read the sources instead.
  DryRun,
  /// No sources; the tool was not invoked.
  NoInputs,
}

/// Errors from a merge invocation.
#[derive(Debug, Error)]
pub enum MergeError {
  /// The merge tool is not installed or not on PATH.
  #[error("merge tool '{tool}' not found; set up the environment providing it")]
  ToolUnavailable { tool: String },

  /// The merge tool exited unsuccessfully.
  #[error("merge failed with exit code {code:?}: {cmd}")]
  ExecutionFailed { cmd: String, code: Option<i32> },

  /// The merge tool did not finish within the configured timeout.
  #[error("merge timed out after {timeout:?}: {cmd}")]
  TimedOut { cmd: String, timeout: Duration },

  /// The process could not be spawned or its destination prepared.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Runs the merge tool, or stands in for it in dry-run mode.
#[derive(Debug, Clone)]
pub struct MergeExecutor {
  tool: String,
  timeout: Option<Duration>,
}

impl MergeExecutor {
  pub fn new(tool: impl Into<String>, timeout: Option<Duration>) -> Self {
    Self {
      tool: tool.into(),
      timeout,
    }
  }

  pub fn tool(&self) -> &str {
    &self.tool
  }

  /// Full argv for merging `sources` into `destination`.
  pub fn command_line(&self, sources: &[PathBuf], destination: &Path) -> Vec<String> {
    let mut argv = Vec::with_capacity(sources.len() + 3);
    argv.push(self.tool.clone());
    argv.push("-f".to_string());
    argv.push(destination.display().to_string());
    argv.extend(sources.iter().map(|p| p.display().to_string()));
    argv
  }

  /// Merge `sources` into `destination`.
  ///
  /// # Behavior
  ///
  /// - No sources: returns [`MergeOutcome::NoInputs`] without running anything.
  /// - `execute == false`: logs the command and returns [`MergeOutcome::DryRun`];
  ///   nothing on disk is touched.
  /// - Otherwise runs the tool. A missing tool, a non-zero exit or a timeout is
  ///   an error scoped to this one merge.
  pub async fn merge(&self, sources: &[PathBuf], destination: &Path, execute: bool) -> Result<MergeOutcome, MergeError> {
    if sources.is_empty() {
      return Ok(MergeOutcome::NoInputs);
    }

    let argv = self.command_line(sources, destination);
    let cmd_display = argv.join(" ");
    info!(cmd = %cmd_display, "merge command");

    if !execute {
      info!(destination = %destination.display(), "dry run; merge not executed");
      return Ok(MergeOutcome::DryRun);
    }

    let program = which::which(&self.tool).map_err(|_| MergeError::ToolUnavailable {
      tool: self.tool.clone(),
    })?;

    if let Some(parent) = destination.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }

    let mut command = Command::new(&program);
    command.args(&argv[1..]).kill_on_drop(true);

    debug!(program = %program.display(), sources = sources.len(), "spawning merge");

    let output = match self.timeout {
      Some(timeout) => match tokio::time::timeout(timeout, command.output()).await {
        Ok(output) => output?,
        Err(_) => {
          return Err(MergeError::TimedOut {
            cmd: cmd_display,
            timeout,
          });
        }
      },
      None => command.output().await?,
    };

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      if !stderr.is_empty() {
        debug!(stderr = %stderr, "merge stderr");
      }
      return Err(MergeError::ExecutionFailed {
        cmd: cmd_display,
        code: output.status.code(),
      });
    }

    info!(destination = %destination.display(), "merge succeeded");
    Ok(MergeOutcome::Merged)
  }
}
