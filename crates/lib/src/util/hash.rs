//! Hashing for content-addressed layers and images.
//!
//! - [`ObjectHash`]: truncated hash of a serialized definition, used as a
//!   store directory name.
//! - [`ContentHash`]: full SHA-256 of file or directory contents, used to
//!   detect corrupted layers and to key the dependency manifest.

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::consts::OBJ_HASH_PREFIX_LEN;

pub type HashError = serde_json::Error;

/// Identity of a stored object, derived from its JSON serialization.
///
/// Lowercase hex, [`OBJ_HASH_PREFIX_LEN`] characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl ObjectHash {
  /// First 12 characters, for display.
  pub fn short(&self) -> &str {
    &self.0[..self.0.len().min(12)]
  }
}

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ObjectHash, HashError> {
    let serialized = serde_json::to_string(self)?;
    let full = hash_bytes(serialized.as_bytes());
    Ok(ObjectHash(full.0[..OBJ_HASH_PREFIX_LEN].to_string()))
  }
}

/// Full 64-character SHA-256 of some content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, thiserror::Error)]
pub enum TreeHashError {
  #[error("failed to walk {path}: {message}")]
  Walk { path: String, message: String },

  #[error("failed to read {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

/// Hash a directory tree.
///
/// Covers relative paths, file contents and symlink targets. Timestamps and
/// permissions are ignored so two copies of the same tree hash equal.
/// Entries whose file name appears in `exclude` are skipped with everything
/// below them.
pub fn hash_directory(path: &Path, exclude: &[&str]) -> Result<ContentHash, TreeHashError> {
  let mut lines: Vec<String> = Vec::new();

  let walker = WalkDir::new(path)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| e.file_name().to_str().map(|name| !exclude.contains(&name)).unwrap_or(true));

  for entry in walker {
    let entry = entry.map_err(|e| TreeHashError::Walk {
      path: path.display().to_string(),
      message: e.to_string(),
    })?;
    let entry_path = entry.path();

    let rel = entry_path
      .strip_prefix(path)
      .unwrap_or(entry_path)
      .to_string_lossy()
      .replace('\\', "/");
    if rel.is_empty() {
      continue;
    }

    let file_type = entry.file_type();
    if file_type.is_symlink() {
      let target = fs::read_link(entry_path).map_err(|e| TreeHashError::Read {
        path: entry_path.display().to_string(),
        source: e,
      })?;
      lines.push(format!("L:{}:{}", rel, hash_bytes(target.to_string_lossy().as_bytes())));
    } else if file_type.is_dir() {
      lines.push(format!("D:{}", rel));
    } else if file_type.is_file() {
      lines.push(format!("F:{}:{}", rel, hash_file(entry_path)?));
    }
  }

  lines.sort();

  let mut hasher = Sha256::new();
  for line in lines {
    hasher.update(line.as_bytes());
    hasher.update(b"\n");
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

/// Hash a single file, streaming its contents.
pub fn hash_file(path: &Path) -> Result<ContentHash, TreeHashError> {
  let read_err = |e| TreeHashError::Read {
    path: path.display().to_string(),
    source: e,
  };

  let mut file = fs::File::open(path).map_err(read_err)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let n = file.read(&mut buffer).map_err(read_err)?;
    if n == 0 {
      break;
    }
    hasher.update(&buffer[..n]);
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(format!("{:x}", hasher.finalize()))
}
