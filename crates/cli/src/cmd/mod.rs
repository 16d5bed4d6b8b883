mod build;
mod dockerfile;
mod gc;
mod inspect;
mod list;
mod plan;
mod run;

pub use build::{BuildTarget, InstallerKind, cmd_build};
pub use dockerfile::cmd_dockerfile;
pub use gc::cmd_gc;
pub use inspect::cmd_inspect;
pub use list::cmd_list;
pub use plan::cmd_plan;
pub use run::cmd_run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use cdstage_lib::image::{ImageIndex, ImageRecord, IndexEntry, LayerRecord, load_image};
use cdstage_lib::profile::Profile;

/// Absolute form of a user-supplied build context.
fn context_dir(context: &Path) -> Result<PathBuf> {
  anyhow::ensure!(context.is_dir(), "build context {} is not a directory", context.display());
  std::path::absolute(context).with_context(|| format!("Failed to resolve {}", context.display()))
}

/// Latest indexed image of a profile, verified against the store.
fn latest_image(store: &Path, profile: Profile) -> Result<(IndexEntry, ImageRecord, LayerRecord)> {
  let entry = ImageIndex::default_index()
    .latest(profile)
    .context("Failed to read image index")?
    .with_context(|| format!("No {profile} image has been built; run `cdstage build {profile}` first"))?;
  let (record, layer) = load_image(store, &entry.image)
    .with_context(|| format!("Failed to load {profile} image {}", entry.image.short()))?;
  Ok((entry, record, layer))
}
