//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages, POT and elapsed-time formatting, and Unicode symbols.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

/// POT values span many orders of magnitude; show three significant decimals.
pub fn format_pot(pot: f64) -> String {
  if pot == 0.0 {
    "0".to_string()
  } else {
    format!("{:.3e}", pot)
  }
}

/// Wall-clock time at millisecond resolution, e.g. `1m 5s 20ms`.
pub fn format_elapsed(elapsed: Duration) -> String {
  let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
  humantime::format_duration(Duration::from_millis(millis)).to_string()
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_format_pot() {
    assert_eq!(format_pot(0.0), "0");
    assert_eq!(format_pot(1.5e20), "1.500e20");
    assert_eq!(format_pot(3.0e19), "3.000e19");
  }

  #[test]
  fn test_format_elapsed() {
    assert_eq!(format_elapsed(Duration::from_micros(50_700)), "50ms");
    assert_eq!(format_elapsed(Duration::from_millis(1500)), "1s 500ms");
    assert_eq!(format_elapsed(Duration::from_secs(65)), "1m 5s");
  }
}
