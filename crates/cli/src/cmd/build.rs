//! Implementation of the `cdstage build` command.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use tracing::debug;

use cdstage_lib::blueprint::Blueprint;
use cdstage_lib::config::ProjectConfig;
use cdstage_lib::image::{BuildError, BuildOutcome, ImageBuilder, ImageIndex};
use cdstage_lib::install::{CommandInstaller, Installer, RecordInstaller};
use cdstage_lib::platform::paths::store_dir;
use cdstage_lib::profile::Profile;
use cdstage_lib::stage::BuildState;
use cdstage_lib::store_lock::{LockMode, StoreLock};
use cdstage_lib::util::hash::ObjectHash;

use super::context_dir;
use crate::output::{OutputFormat, Status, field, format_duration, print_json};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BuildTarget {
  Development,
  Production,
  All,
}

impl BuildTarget {
  fn profile(self) -> Option<Profile> {
    match self {
      BuildTarget::Development => Some(Profile::Development),
      BuildTarget::Production => Some(Profile::Production),
      BuildTarget::All => None,
    }
  }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum InstallerKind {
  /// Run the configured installer program (pip by default)
  Command,
  /// Validate and record the dependency set without installing
  Record,
}

#[derive(Serialize)]
struct BuiltImage {
  profile: Profile,
  id: ObjectHash,
  base_layer: ObjectHash,
  state: BuildState,
  cached: bool,
  embedded_files: usize,
  packages: Vec<String>,
  path: PathBuf,
}

#[derive(Serialize)]
struct BuildSummary {
  context: PathBuf,
  images: Vec<BuiltImage>,
  duration_ms: u128,
}

/// Build the requested images and record them in the image index.
///
/// The store is locked exclusively for the whole build. Nothing is recorded
/// unless every requested image was built.
pub fn cmd_build(target: BuildTarget, context: &Path, installer: InstallerKind, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let context = context_dir(context)?;
  let config = ProjectConfig::load(&context).context("Failed to load project configuration")?;
  let store = store_dir();
  debug!(context = %context.display(), store = %store.display(), ?target, "starting build");

  let _lock = StoreLock::acquire(&store, LockMode::Exclusive, "build").context("Failed to acquire store lock")?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let blueprint = Blueprint::new(config.clone());
  let outcomes = match installer {
    InstallerKind::Command => {
      let builder = ImageBuilder::new(&context, blueprint, CommandInstaller::from_config(&config)).with_store(&store);
      rt.block_on(build_target(builder, target))
    }
    InstallerKind::Record => {
      let builder = ImageBuilder::new(&context, blueprint, RecordInstaller).with_store(&store);
      rt.block_on(build_target(builder, target))
    }
  }
  .context("Build failed")?;

  let index = ImageIndex::default_index();
  for outcome in &outcomes {
    index
      .record(outcome.record.profile, &outcome.record.id, &outcome.record.base_layer, &context)
      .context("Failed to update image index")?;
  }

  let summary = BuildSummary {
    context,
    images: outcomes.into_iter().map(built_image).collect(),
    duration_ms: start.elapsed().as_millis(),
  };

  if output.is_json() {
    print_json(&summary)?;
  } else {
    for image in &summary.images {
      let cached = if image.cached { " (cached)" } else { "" };
      Status::Success.print(&format!("Built {} image {}{}", image.profile, image.id.short(), cached));
      field("Base layer", image.base_layer.short());
      field("Packages", &image.packages.len().to_string());
      field("Embedded files", &image.embedded_files.to_string());
    }
    field("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}

async fn build_target<I: Installer>(
  mut builder: ImageBuilder<I>,
  target: BuildTarget,
) -> Result<Vec<BuildOutcome>, BuildError> {
  match target.profile() {
    Some(profile) => Ok(vec![builder.build(profile).await?]),
    None => builder.build_all().await,
  }
}

fn built_image(outcome: BuildOutcome) -> BuiltImage {
  BuiltImage {
    profile: outcome.record.profile,
    id: outcome.record.id,
    base_layer: outcome.record.base_layer,
    state: outcome.state,
    cached: outcome.cached,
    embedded_files: outcome.record.embedded_files,
    packages: outcome.layer.packages,
    path: outcome.path,
  }
}
