//! Index of built images.
//!
//! ```text
//! {data_dir}/images/
//! └── index.json          # ImageIndexFile: one entry per built image
//! ```
//!
//! The index is what `run` and `inspect` use to find the latest image of a
//! profile, and what `gc` treats as the set of live store entries.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::paths::images_dir;
use crate::profile::Profile;
use crate::util::hash::ObjectHash;

pub const IMAGE_INDEX_VERSION: u32 = 1;

const INDEX_FILENAME: &str = "index.json";

#[derive(Debug, Error)]
pub enum IndexError {
  #[error("failed to read image index: {0}")]
  Read(#[source] io::Error),

  #[error("failed to parse image index: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize image index: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to write image index: {0}")]
  Write(#[source] io::Error),

  #[error("unsupported image index version {0}")]
  UnsupportedVersion(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
  pub profile: Profile,
  pub image: ObjectHash,
  pub base_layer: ObjectHash,
  /// Seconds since the Unix epoch.
  pub built_at: u64,
  /// Build context the image was built from.
  pub context: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageIndexFile {
  pub version: u32,
  pub entries: Vec<IndexEntry>,
}

impl Default for ImageIndexFile {
  fn default() -> Self {
    Self {
      version: IMAGE_INDEX_VERSION,
      entries: Vec::new(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct ImageIndex {
  base_path: PathBuf,
}

impl ImageIndex {
  pub fn new(base_path: PathBuf) -> Self {
    Self { base_path }
  }

  /// Index at the default location under the data directory.
  pub fn default_index() -> Self {
    Self::new(images_dir())
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  fn index_path(&self) -> PathBuf {
    self.base_path.join(INDEX_FILENAME)
  }

  /// Returns an empty index if the file doesn't exist.
  pub fn load(&self) -> Result<ImageIndexFile, IndexError> {
    let content = match fs::read_to_string(self.index_path()) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ImageIndexFile::default()),
      Err(e) => return Err(IndexError::Read(e)),
    };

    let index: ImageIndexFile = serde_json::from_str(&content).map_err(IndexError::Parse)?;
    if index.version != IMAGE_INDEX_VERSION {
      return Err(IndexError::UnsupportedVersion(index.version));
    }
    Ok(index)
  }

  fn save(&self, index: &ImageIndexFile) -> Result<(), IndexError> {
    fs::create_dir_all(&self.base_path).map_err(IndexError::Write)?;

    let path = self.index_path();
    let temp_path = self.base_path.join("index.json.tmp");
    let content = serde_json::to_string_pretty(index).map_err(IndexError::Serialize)?;
    fs::write(&temp_path, &content).map_err(IndexError::Write)?;
    fs::rename(&temp_path, &path).map_err(IndexError::Write)?;
    Ok(())
  }

  /// Record a built image.
  ///
  /// The new entry supersedes any earlier entry for the same profile and
  /// build context, so only the latest build of each stays live for `gc`.
  /// Rebuilding an image already in the index moves it to the end and
  /// refreshes its timestamp.
  pub fn record(
    &self,
    profile: Profile,
    image: &ObjectHash,
    base_layer: &ObjectHash,
    context: &Path,
  ) -> Result<IndexEntry, IndexError> {
    let mut index = self.load()?;
    index
      .entries
      .retain(|e| &e.image != image && !(e.profile == profile && e.context == context));

    let entry = IndexEntry {
      profile,
      image: image.clone(),
      base_layer: base_layer.clone(),
      built_at: now_secs(),
      context: context.to_path_buf(),
    };
    index.entries.push(entry.clone());
    self.save(&index)?;
    Ok(entry)
  }

  /// Most recently recorded image of a profile.
  pub fn latest(&self, profile: Profile) -> Result<Option<IndexEntry>, IndexError> {
    Ok(self.load()?.entries.into_iter().rev().find(|e| e.profile == profile))
  }

  /// Find an entry by full hash or unique prefix.
  pub fn find(&self, id: &str) -> Result<Option<IndexEntry>, IndexError> {
    let entries = self.load()?.entries;
    let mut matches = entries.into_iter().filter(|e| e.image.0.starts_with(id));
    match (matches.next(), matches.next()) {
      (Some(entry), None) => Ok(Some(entry)),
      _ => Ok(None),
    }
  }

  pub fn entries(&self) -> Result<Vec<IndexEntry>, IndexError> {
    Ok(self.load()?.entries)
  }

  /// Drop an entry. Returns whether it existed.
  pub fn remove(&self, image: &ObjectHash) -> Result<bool, IndexError> {
    let mut index = self.load()?;
    let before = index.entries.len();
    index.entries.retain(|e| &e.image != image);
    if index.entries.len() == before {
      return Ok(false);
    }
    self.save(&index)?;
    Ok(true)
  }

  /// Every store hash referenced by the index: images and their layers.
  pub fn live_hashes(&self) -> Result<HashSet<String>, IndexError> {
    let mut live = HashSet::new();
    for entry in self.load()?.entries {
      live.insert(entry.image.0);
      live.insert(entry.base_layer.0);
    }
    Ok(live)
  }
}

fn now_secs() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0)
}
