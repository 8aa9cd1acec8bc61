//! Column reader backed by an external command.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use tracing::debug;

use super::{ColumnReader, ExposureError};
use crate::consts::READER_NOT_FOUND_EXIT;
use crate::util::process::run_captured;

/// Runs `<program> <file> <tree> <branch>` and parses whitespace-separated
/// numbers from stdout. Exit code [`READER_NOT_FOUND_EXIT`] means the tree
/// or branch does not exist.
#[derive(Debug, Clone)]
pub struct CommandColumnReader {
  program: String,
  timeout: Option<Duration>,
}

impl CommandColumnReader {
  pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
    Self {
      program: program.into(),
      timeout,
    }
  }

  pub fn program(&self) -> &str {
    &self.program
  }
}

impl ColumnReader for CommandColumnReader {
  fn read_branch(&self, path: &Path, tree: &str, branch: &str) -> Result<Vec<f64>, ExposureError> {
    let program = which::which(&self.program).map_err(|_| ExposureError::ReaderUnavailable {
      program: self.program.clone(),
    })?;

    let mut command = Command::new(program);
    command.arg(path).arg(tree).arg(branch);
    debug!(file = %path.display(), tree, branch, "reading branch");

    let output = run_captured(command, self.timeout)?;
    match output.status.code() {
      Some(0) => parse_values(&output.stdout),
      Some(READER_NOT_FOUND_EXIT) => Err(ExposureError::NotFound {
        path: path.to_path_buf(),
        tree: tree.to_string(),
        branch: branch.to_string(),
      }),
      _ => {
        let stderr = output.stderr.trim();
        let message = if stderr.is_empty() {
          format!("exited with {}", output.status)
        } else {
          stderr.to_string()
        };
        Err(ExposureError::Reader {
          path: path.to_path_buf(),
          message,
        })
      }
    }
  }
}

/// Parse whitespace-separated floating point values.
pub fn parse_values(text: &str) -> Result<Vec<f64>, ExposureError> {
  text
    .split_whitespace()
    .map(|token| {
      token.parse::<f64>().map_err(|_| ExposureError::InvalidValue {
        value: token.to_string(),
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_mixed_layout() {
    let values = parse_values("1.5e20\n2\n  3.25 4\n").unwrap();
    assert_eq!(values, vec![1.5e20, 2.0, 3.25, 4.0]);
  }

  #[test]
  fn empty_output_is_empty_column() {
    assert!(parse_values("\n").unwrap().is_empty());
  }

  #[test]
  fn rejects_garbage() {
    let err = parse_values("1.0 nope").unwrap_err();
    assert!(matches!(err, ExposureError::InvalidValue { ref value } if value == "nope"));
  }

  #[test]
  fn missing_program_is_unavailable() {
    let reader = CommandColumnReader::new("definitely-not-a-reader", None);
    let err = reader.read_branch(Path::new("/tmp/x.root"), "t", "b").unwrap_err();
    assert!(matches!(err, ExposureError::ReaderUnavailable { .. }));
  }

  #[cfg(unix)]
  mod command {
    use super::*;
    use crate::util::testutil::write_script;
    use tempfile::TempDir;

    fn fake_reader(dir: &Path) -> String {
      let body = r#"case "$3" in
  pot) echo "1.0e20 2.0e20" ;;
  missing) exit 3 ;;
  *) echo "boom" >&2; exit 1 ;;
esac"#;
      write_script(dir, "fake-reader", body).display().to_string()
    }

    #[test]
    fn reads_values() {
      let temp = TempDir::new().unwrap();
      let reader = CommandColumnReader::new(fake_reader(temp.path()), Some(Duration::from_secs(10)));
      let values = reader.read_branch(Path::new("a.root"), "nuselection/SubRun", "pot").unwrap();
      assert_eq!(values, vec![1.0e20, 2.0e20]);
    }

    #[test]
    fn maps_not_found_exit_code() {
      let temp = TempDir::new().unwrap();
      let reader = CommandColumnReader::new(fake_reader(temp.path()), None);
      let err = reader.read_branch(Path::new("a.root"), "t", "missing").unwrap_err();
      assert!(matches!(err, ExposureError::NotFound { ref branch, .. } if branch == "missing"));
    }

    #[test]
    fn other_failures_carry_stderr() {
      let temp = TempDir::new().unwrap();
      let reader = CommandColumnReader::new(fake_reader(temp.path()), None);
      let err = reader.read_branch(Path::new("a.root"), "t", "other").unwrap_err();
      assert!(matches!(err, ExposureError::Reader { ref message, .. } if message == "boom"));
    }
  }
}
