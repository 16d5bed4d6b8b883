//! Dependency manifest loading.
//!
//! The base stage consumes `requirements.txt` exactly once. A missing, empty
//! or malformed manifest fails the base stage and therefore every profile.

mod parse;
mod types;

pub use parse::parse_requirements;
pub use types::*;

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::util::hash::hash_bytes;

impl RequirementsManifest {
  /// Parse and validate manifest text.
  pub fn parse(source: &str) -> Result<Self, RequirementsError> {
    let entries = parse_requirements(source)?;
    Ok(Self {
      entries,
      source: source.to_string(),
      content_hash: hash_bytes(source.as_bytes()),
    })
  }

  /// Load and validate a manifest file.
  pub fn load(path: &Path) -> Result<Self, RequirementsError> {
    let source = fs::read_to_string(path).map_err(|e| {
      if e.kind() == io::ErrorKind::NotFound {
        RequirementsError::Missing {
          path: path.to_path_buf(),
        }
      } else {
        RequirementsError::Read {
          path: path.to_path_buf(),
          source: e,
        }
      }
    })?;

    let manifest = Self::parse(&source)?;
    debug!(path = %path.display(), packages = manifest.len(), "loaded dependency manifest");
    Ok(manifest)
  }
}
