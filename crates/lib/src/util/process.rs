//! Blocking subprocess execution with a deadline.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum ProcessError {
  #[error("failed to spawn '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("'{program}' did not finish within {timeout:?}")]
  TimedOut { program: String, timeout: Duration },

  #[error("failed waiting on '{program}': {source}")]
  Wait {
    program: String,
    #[source]
    source: std::io::Error,
  },
}

/// Captured result of a finished process.
#[derive(Debug)]
pub struct CapturedOutput {
  pub status: ExitStatus,
  pub stdout: String,
  pub stderr: String,
}

/// Run `command` to completion, capturing stdout and stderr.
///
/// With a timeout, the child is killed once the deadline passes. The pipes are
/// drained on helper threads so a chatty child cannot block on a full pipe.
pub fn run_captured(mut command: Command, timeout: Option<Duration>) -> Result<CapturedOutput, ProcessError> {
  let program = command.get_program().to_string_lossy().into_owned();

  let mut child = command
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()
    .map_err(|source| ProcessError::Spawn {
      program: program.clone(),
      source,
    })?;

  let stdout = drain(child.stdout.take());
  let stderr = drain(child.stderr.take());

  let deadline = timeout.map(|t| (Instant::now() + t, t));
  let status = loop {
    match child.try_wait() {
      Ok(Some(status)) => break status,
      Ok(None) => {}
      Err(source) => {
        let _ = child.kill();
        return Err(ProcessError::Wait { program, source });
      }
    }

    if let Some((deadline, timeout)) = deadline {
      if Instant::now() >= deadline {
        let _ = child.kill();
        let _ = child.wait();
        return Err(ProcessError::TimedOut { program, timeout });
      }
    }

    thread::sleep(POLL_INTERVAL);
  };

  Ok(CapturedOutput {
    status,
    stdout: stdout.join().unwrap_or_default(),
    stderr: stderr.join().unwrap_or_default(),
  })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
  thread::spawn(move || {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
      let _ = pipe.read_to_string(&mut buf);
    }
    buf
  })
}
