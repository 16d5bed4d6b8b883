use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::hash::ContentHash;

#[derive(Debug, Error)]
pub enum RequirementsError {
  #[error("dependency manifest not found: {}", path.display())]
  Missing { path: PathBuf },

  #[error("failed to read dependency manifest {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("dependency manifest lists no packages")]
  Empty,

  #[error("malformed requirement on line {line} ('{content}'): {reason}")]
  Malformed {
    line: usize,
    content: String,
    reason: String,
  },
}

/// Version comparison operators accepted in specifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
  #[serde(rename = "===")]
  Identity,
  #[serde(rename = "==")]
  Equal,
  #[serde(rename = "!=")]
  NotEqual,
  #[serde(rename = "~=")]
  Compatible,
  #[serde(rename = ">=")]
  GreaterEqual,
  #[serde(rename = "<=")]
  LessEqual,
  #[serde(rename = ">")]
  Greater,
  #[serde(rename = "<")]
  Less,
}

impl Operator {
  /// Longest operators first so `>=` is not read as `>`.
  pub(crate) const PARSE_ORDER: [Operator; 8] = [
    Operator::Identity,
    Operator::Equal,
    Operator::NotEqual,
    Operator::Compatible,
    Operator::GreaterEqual,
    Operator::LessEqual,
    Operator::Greater,
    Operator::Less,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Operator::Identity => "===",
      Operator::Equal => "==",
      Operator::NotEqual => "!=",
      Operator::Compatible => "~=",
      Operator::GreaterEqual => ">=",
      Operator::LessEqual => "<=",
      Operator::Greater => ">",
      Operator::Less => "<",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Specifier {
  pub op: Operator,
  pub version: String,
}

impl fmt::Display for Specifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{}", self.op.as_str(), self.version)
  }
}

/// One package requirement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirement {
  /// Name as written.
  pub name: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub extras: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub specifiers: Vec<Specifier>,
  /// Direct reference (`name @ url`).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,
  /// Environment marker after `;`, kept verbatim.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub marker: Option<String>,
}

impl Requirement {
  /// Normalized project name: lowercase, runs of `-`, `_`, `.` collapsed to `-`.
  pub fn normalized_name(&self) -> String {
    normalize_name(&self.name)
  }
}

impl fmt::Display for Requirement {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.normalized_name())?;
    if !self.extras.is_empty() {
      write!(f, "[{}]", self.extras.join(","))?;
    }
    if let Some(url) = &self.url {
      write!(f, " @ {}", url)?;
    }
    let specs: Vec<String> = self.specifiers.iter().map(|s| s.to_string()).collect();
    f.write_str(&specs.join(","))?;
    if let Some(marker) = &self.marker {
      write!(f, "; {}", marker)?;
    }
    Ok(())
  }
}

pub(crate) fn normalize_name(name: &str) -> String {
  let mut out = String::with_capacity(name.len());
  let mut in_sep = false;
  for c in name.chars() {
    if matches!(c, '-' | '_' | '.') {
      if !in_sep {
        out.push('-');
      }
      in_sep = true;
    } else {
      out.push(c.to_ascii_lowercase());
      in_sep = false;
    }
  }
  out
}

/// A validated dependency manifest.
///
/// `source` holds the exact bytes read so the base layer installs from an
/// identical copy; `content_hash` keys the layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementsManifest {
  pub entries: Vec<Requirement>,
  pub source: String,
  pub content_hash: ContentHash,
}

impl RequirementsManifest {
  /// Canonical, sorted form of every entry. This is what the base layer
  /// records as its installed set.
  pub fn installed_set(&self) -> Vec<String> {
    let mut set: Vec<String> = self.entries.iter().map(|r| r.to_string()).collect();
    set.sort();
    set
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
