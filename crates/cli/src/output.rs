//! Terminal output shared by all commands.

use std::time::{Duration, UNIX_EPOCH};

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{AnsiColors, OwoColorize, Stream};

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

/// Kind of a one-line status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Success,
  Info,
  Warning,
  Error,
}

impl Status {
  fn symbol(self) -> &'static str {
    match self {
      Status::Success => "✓",
      Status::Info => "•",
      Status::Warning => "⚠",
      Status::Error => "✗",
    }
  }

  fn color(self) -> AnsiColors {
    match self {
      Status::Success => AnsiColors::Green,
      Status::Info => AnsiColors::Blue,
      Status::Warning => AnsiColors::Yellow,
      Status::Error => AnsiColors::Red,
    }
  }

  /// Warnings and errors go to stderr with the whole line colored.
  pub fn print(self, message: &str) {
    let color = self.color();
    match self {
      Status::Success | Status::Info => println!(
        "{} {}",
        self.symbol().if_supports_color(Stream::Stdout, |s| s.color(color)),
        message
      ),
      Status::Warning | Status::Error => eprintln!(
        "{} {}",
        self.symbol().if_supports_color(Stream::Stderr, |s| s.color(color)),
        message.if_supports_color(Stream::Stderr, |s| s.color(color))
      ),
    }
  }
}

/// An indented `label: value` line below a status message.
pub fn field(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

/// An entry of a list under a field, e.g. a lineage step or a file.
pub fn list_item(value: &str) {
  println!("    {} {}", "→".if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Binary-prefixed size with one decimal.
pub fn format_bytes(bytes: u64) -> String {
  const UNITS: [&str; 3] = ["KB", "MB", "GB"];
  if bytes < 1024 {
    return format!("{} B", bytes);
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit + 1 < UNITS.len() {
    value /= 1024.0;
    unit += 1;
  }
  format!("{:.1} {}", value, UNITS[unit])
}

/// Elapsed time truncated to milliseconds.
pub fn format_duration(duration: Duration) -> String {
  let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
  humantime::format_duration(Duration::from_millis(millis)).to_string()
}

/// RFC 3339 timestamp, second precision.
pub fn format_timestamp(unix_secs: u64) -> String {
  humantime::format_rfc3339_seconds(UNIX_EPOCH + Duration::from_secs(unix_secs)).to_string()
}
