//! Store garbage collection.
//!
//! Anything in the store that the image index does not reference is
//! garbage: superseded images, base layers no image points at, incomplete
//! entries and leftover staging directories. Index entries whose image has
//! vanished from the store are pruned first.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::{fs, io};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::image::store::{IMAGE_DIR, LAYER_DIR, TMP_DIR, image_path, is_complete};
use crate::image::{ImageIndex, IndexError};
use crate::util::fs::dir_size;

#[derive(Debug, Error)]
pub enum GcError {
  #[error("failed to read image index: {0}")]
  Index(#[from] IndexError),

  #[error("failed to read store directory {}: {source}", path.display())]
  ReadStore {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Default, serde::Serialize)]
pub struct GcStats {
  pub layers_scanned: usize,
  pub layers_deleted: usize,
  pub images_scanned: usize,
  pub images_deleted: usize,
  pub staging_deleted: usize,
  pub index_entries_pruned: usize,
  pub bytes_freed: u64,
}

impl GcStats {
  pub fn total_deleted(&self) -> usize {
    self.layers_deleted + self.images_deleted + self.staging_deleted
  }
}

#[derive(Debug, serde::Serialize)]
pub struct GcResult {
  pub stats: GcStats,
  pub deleted_paths: Vec<PathBuf>,
}

#[derive(Clone, Copy)]
enum Kind {
  Layer,
  Image,
  Staging,
}

pub fn collect_garbage(store: &Path, index: &ImageIndex, dry_run: bool) -> Result<GcResult, GcError> {
  let mut stats = GcStats::default();
  let mut deleted_paths = Vec::new();

  let mut live = HashSet::new();
  for entry in index.entries()? {
    if is_complete(&image_path(store, &entry.image)) {
      live.insert(entry.image.0);
      live.insert(entry.base_layer.0);
      continue;
    }

    debug!(image = %entry.image, "pruning index entry for missing image");
    stats.index_entries_pruned += 1;
    if !dry_run {
      index.remove(&entry.image)?;
    }
  }
  debug!(count = live.len(), "collected live hashes from image index");

  let sweeps = [(LAYER_DIR, Kind::Layer), (IMAGE_DIR, Kind::Image), (TMP_DIR, Kind::Staging)];
  for (dir, kind) in sweeps {
    let path = store.join(dir);
    if path.exists() {
      sweep(&path, kind, &live, dry_run, &mut stats, &mut deleted_paths)?;
    }
  }

  info!(
    layers_deleted = stats.layers_deleted,
    images_deleted = stats.images_deleted,
    bytes_freed = stats.bytes_freed,
    dry_run,
    "garbage collection complete"
  );

  Ok(GcResult { stats, deleted_paths })
}

fn sweep(
  dir: &Path,
  kind: Kind,
  live: &HashSet<String>,
  dry_run: bool,
  stats: &mut GcStats,
  deleted_paths: &mut Vec<PathBuf>,
) -> Result<(), GcError> {
  let entries = fs::read_dir(dir).map_err(|source| GcError::ReadStore {
    path: dir.to_path_buf(),
    source,
  })?;

  let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).filter(|p| p.is_dir()).collect();
  paths.sort();

  for path in paths {
    match kind {
      Kind::Layer => stats.layers_scanned += 1,
      Kind::Image => stats.images_scanned += 1,
      Kind::Staging => {}
    }

    let keep = match kind {
      Kind::Staging => false,
      Kind::Layer | Kind::Image => {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        live.contains(name) && is_complete(&path)
      }
    };
    if keep {
      continue;
    }

    debug!(path = %path.display(), "removing unreferenced store entry");
    let size = dir_size(&path);

    if !dry_run {
      if let Err(e) = fs::remove_dir_all(&path) {
        warn!(path = %path.display(), error = %e, "failed to delete store entry");
        continue;
      }
    }

    match kind {
      Kind::Layer => stats.layers_deleted += 1,
      Kind::Image => stats.images_deleted += 1,
      Kind::Staging => stats.staging_deleted += 1,
    }
    stats.bytes_freed += size;
    deleted_paths.push(path);
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::blueprint::Blueprint;
  use crate::config::ProjectConfig;
  use crate::image::ImageBuilder;
  use crate::install::RecordInstaller;
  use crate::profile::Profile;
  use crate::util::testutil::{build_context, write_context};
  use tempfile::TempDir;

  struct Fixture {
    context: TempDir,
    store: TempDir,
    data: TempDir,
  }

  impl Fixture {
    fn new() -> Self {
      Self {
        context: build_context(),
        store: TempDir::new().unwrap(),
        data: TempDir::new().unwrap(),
      }
    }

    fn index(&self) -> ImageIndex {
      ImageIndex::new(self.data.path().join("images"))
    }

    async fn build_and_record(&self, profile: Profile) -> crate::image::BuildOutcome {
      let outcome = ImageBuilder::new(self.context.path(), Blueprint::new(ProjectConfig::default()), RecordInstaller)
        .with_store(self.store.path())
        .build(profile)
        .await
        .unwrap();
      self
        .index()
        .record(profile, &outcome.record.id, &outcome.record.base_layer, self.context.path())
        .unwrap();
      outcome
    }
  }

  #[tokio::test]
  async fn keeps_everything_referenced() {
    let fx = Fixture::new();
    fx.build_and_record(Profile::Development).await;
    fx.build_and_record(Profile::Production).await;

    let result = collect_garbage(fx.store.path(), &fx.index(), false).unwrap();

    assert_eq!(result.stats.total_deleted(), 0);
    assert_eq!(result.stats.layers_scanned, 1);
    assert_eq!(result.stats.images_scanned, 2);
  }

  #[tokio::test]
  async fn removes_superseded_image_and_layer() {
    let fx = Fixture::new();
    let old = fx.build_and_record(Profile::Development).await;

    write_context(fx.context.path(), "fastapi==0.111.0\n", false);
    fx.build_and_record(Profile::Development).await;

    let result = collect_garbage(fx.store.path(), &fx.index(), false).unwrap();

    assert_eq!(result.stats.layers_deleted, 1);
    assert_eq!(result.stats.images_deleted, 1);
    assert_eq!(result.stats.index_entries_pruned, 0);
    assert!(!old.layer_path.exists());
    assert!(!old.path.exists());
    assert_eq!(fx.index().entries().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn superseded_image_keeps_shared_layer() {
    let fx = Fixture::new();
    let old = fx.build_and_record(Profile::Production).await;
    fx.build_and_record(Profile::Development).await;

    std::fs::write(fx.context.path().join("app/main.py"), "app = None\n").unwrap();
    let new = fx.build_and_record(Profile::Production).await;
    assert_ne!(old.record.id, new.record.id);

    let result = collect_garbage(fx.store.path(), &fx.index(), false).unwrap();

    assert_eq!(result.stats.images_deleted, 1);
    assert_eq!(result.stats.layers_deleted, 0);
    assert!(!old.path.exists());
    assert!(new.path.exists());
    assert!(new.layer_path.exists());
  }

  #[tokio::test]
  async fn dry_run_deletes_nothing() {
    let fx = Fixture::new();
    let outcome = fx.build_and_record(Profile::Production).await;
    write_context(fx.context.path(), "fastapi==0.111.0\n", false);
    fx.build_and_record(Profile::Production).await;

    let result = collect_garbage(fx.store.path(), &fx.index(), true).unwrap();

    assert_eq!(result.stats.images_deleted, 1);
    assert_eq!(result.stats.layers_deleted, 1);
    assert!(result.stats.bytes_freed > 0);
    assert!(outcome.path.exists());
    assert!(outcome.layer_path.exists());
  }

  #[tokio::test]
  async fn prunes_index_entries_for_missing_images() {
    let fx = Fixture::new();
    let outcome = fx.build_and_record(Profile::Production).await;
    std::fs::remove_dir_all(&outcome.path).unwrap();

    let result = collect_garbage(fx.store.path(), &fx.index(), false).unwrap();

    assert_eq!(result.stats.index_entries_pruned, 1);
    assert_eq!(result.stats.layers_deleted, 1);
    assert!(fx.index().entries().unwrap().is_empty());
  }

  #[tokio::test]
  async fn removes_leftover_staging() {
    let fx = Fixture::new();
    let staging = fx.store.path().join("tmp/abandoned");
    std::fs::create_dir_all(&staging).unwrap();
    std::fs::write(staging.join("partial"), "x").unwrap();

    let result = collect_garbage(fx.store.path(), &fx.index(), false).unwrap();

    assert_eq!(result.stats.staging_deleted, 1);
    assert!(!staging.exists());
  }

  #[test]
  fn empty_store_is_fine() {
    let store = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let result = collect_garbage(store.path(), &ImageIndex::new(data.path().join("images")), false).unwrap();
    assert_eq!(result.stats.total_deleted(), 0);
  }
}
