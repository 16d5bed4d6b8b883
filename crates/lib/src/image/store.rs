//! Store layout for layers and images.
//!
//! ```text
//! <store>/
//!   layer/<hash>/            base layer (requirements copy + site-packages)
//!   image/<hash>/            leaf image (embedded app tree + image.json)
//!   tmp/<hash>/              staging area, renamed into place when complete
//! ```
//!
//! Every finished entry carries a completion marker holding the hash of
//! everything else in the directory. Entries without a valid marker are
//! treated as garbage.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use super::types::BuildError;
use crate::util::hash::{ObjectHash, hash_directory};

pub const LAYER_DIR: &str = "layer";
pub const IMAGE_DIR: &str = "image";
pub const TMP_DIR: &str = "tmp";
pub const ROOTFS_DIR: &str = "rootfs";

/// Marker file name indicating an entry was fully assembled.
pub const COMPLETE_MARKER: &str = ".cdstage-complete";

const MARKER_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMarker {
  pub version: u32,
  pub status: String,
  /// SHA-256 over the entry, excluding the marker itself.
  pub output_hash: String,
}

pub fn layer_path(store: &Path, hash: &ObjectHash) -> PathBuf {
  store.join(LAYER_DIR).join(&hash.0)
}

pub fn image_path(store: &Path, hash: &ObjectHash) -> PathBuf {
  store.join(IMAGE_DIR).join(&hash.0)
}

pub fn staging_path(store: &Path, hash: &ObjectHash) -> PathBuf {
  store.join(TMP_DIR).join(&hash.0)
}

pub fn rootfs(entry: &Path) -> PathBuf {
  entry.join(ROOTFS_DIR)
}

/// Map an in-image path onto a host path below `base`.
///
/// `base` is usually an entry's rootfs, with `image_path` absolute inside
/// the image. Relative paths are joined the same way. `..` and prefix
/// components are refused, so the result never leaves `base`.
pub fn in_rootfs(base: &Path, image_path: &str) -> Result<PathBuf, BuildError> {
  let mut out = base.to_path_buf();
  for component in Path::new(image_path).components() {
    match component {
      Component::RootDir | Component::CurDir => {}
      Component::Normal(part) => out.push(part),
      Component::ParentDir | Component::Prefix(_) => {
        return Err(BuildError::PathEscape {
          path: image_path.to_string(),
        });
      }
    }
  }
  Ok(out)
}

pub async fn write_marker(entry: &Path) -> Result<(), BuildError> {
  let output_hash = hash_directory(entry, &[COMPLETE_MARKER])?;
  let marker = CompletionMarker {
    version: MARKER_VERSION,
    status: "complete".to_string(),
    output_hash: output_hash.0,
  };
  let content = serde_json::to_string(&marker).map_err(|e| BuildError::Corrupt {
    path: entry.to_path_buf(),
    message: e.to_string(),
  })?;
  let path = entry.join(COMPLETE_MARKER);
  fs::write(&path, format!("{}\n", content))
    .await
    .map_err(BuildError::io(&path))
}

/// Returns `None` if the marker doesn't exist.
pub fn read_marker(entry: &Path) -> Result<Option<CompletionMarker>, BuildError> {
  let path = entry.join(COMPLETE_MARKER);
  if !path.exists() {
    return Ok(None);
  }
  let content = std::fs::read_to_string(&path).map_err(BuildError::io(&path))?;
  let marker = serde_json::from_str(&content).map_err(|e| BuildError::Corrupt {
    path: path.clone(),
    message: e.to_string(),
  })?;
  Ok(Some(marker))
}

/// Whether the entry has a marker and its content still matches it.
pub fn is_complete(entry: &Path) -> bool {
  match read_marker(entry) {
    Ok(Some(marker)) => verify(entry, &marker),
    _ => false,
  }
}

fn verify(entry: &Path, marker: &CompletionMarker) -> bool {
  match hash_directory(entry, &[COMPLETE_MARKER]) {
    Ok(current) if current.0 == marker.output_hash => true,
    Ok(current) => {
      warn!(
        path = ?entry,
        expected = %marker.output_hash,
        actual = %current.0,
        "store entry corrupted, will rebuild"
      );
      false
    }
    Err(e) => {
      warn!(path = ?entry, error = %e, "failed to hash store entry, will rebuild");
      false
    }
  }
}

/// Check an existing entry. A complete entry is reused; anything else at
/// that path is removed so it can be rebuilt.
pub async fn reuse_or_clear(entry: &Path) -> Result<bool, BuildError> {
  if !entry.exists() {
    return Ok(false);
  }

  match read_marker(entry) {
    Ok(Some(marker)) if verify(entry, &marker) => return Ok(true),
    Ok(Some(_)) => debug!(path = ?entry, "removing corrupted entry"),
    Ok(None) => debug!(path = ?entry, "incomplete entry found, removing"),
    Err(e) => debug!(path = ?entry, error = %e, "invalid marker, removing"),
  }

  fs::remove_dir_all(entry).await.map_err(BuildError::io(entry))?;
  Ok(false)
}

/// Move a finished staging directory to its final location.
pub async fn commit(staging: &Path, dest: &Path) -> Result<(), BuildError> {
  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent).await.map_err(BuildError::io(parent))?;
  }
  if dest.exists() {
    fs::remove_dir_all(dest).await.map_err(BuildError::io(dest))?;
  }
  fs::rename(staging, dest).await.map_err(BuildError::io(dest))
}
