//! Implementation of the `cdstage inspect` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use cdstage_lib::image::store::{image_path, rootfs};
use cdstage_lib::image::{ImageRecord, IndexEntry, LayerRecord};
use cdstage_lib::platform::paths::store_dir;
use cdstage_lib::profile::Profile;
use cdstage_lib::store_lock::{LockMode, StoreLock};
use cdstage_lib::util::fs::{dir_size, list_files};

use super::latest_image;
use crate::output::{OutputFormat, Status, field, format_bytes, format_timestamp, list_item, print_json};

#[derive(Serialize)]
struct InspectOutput {
  entry: IndexEntry,
  image: ImageRecord,
  layer: LayerRecord,
  path: PathBuf,
  size_bytes: u64,
  files: Vec<String>,
}

pub fn cmd_inspect(profile: Profile, output: OutputFormat) -> Result<()> {
  let store = store_dir();
  let _lock = StoreLock::acquire(&store, LockMode::Shared, "inspect").context("Failed to acquire store lock")?;

  let (entry, image, layer) = latest_image(&store, profile)?;
  let path = image_path(&store, &image.id);
  let files = list_files(&rootfs(&path)).context("Failed to list image files")?;

  let inspect = InspectOutput {
    size_bytes: dir_size(&path),
    entry,
    image,
    layer,
    path,
    files,
  };

  if output.is_json() {
    return print_json(&inspect);
  }

  Status::Info.print(&format!("{} image {}", profile, inspect.image.id));
  field("Built", &format_timestamp(inspect.entry.built_at));
  field("Context", &inspect.entry.context.display().to_string());
  field("Base layer", &inspect.layer.hash.to_string());
  field("Installer", &inspect.layer.installer);
  field("Workdir", &inspect.image.config.working_dir);
  field("Command", &inspect.image.config.cmd.join(" "));
  for (key, value) in &inspect.image.config.env {
    field("Env", &format!("{}={}", key, value));
  }
  let ports: Vec<String> = inspect.image.config.exposed_ports.iter().map(|p| p.to_string()).collect();
  field("Ports", &ports.join(", "));
  field("Size", &format_bytes(inspect.size_bytes));
  field("Packages", &inspect.layer.packages.len().to_string());
  for package in &inspect.layer.packages {
    list_item(package);
  }
  field("Files", &inspect.files.len().to_string());
  for file in &inspect.files {
    list_item(file);
  }

  Ok(())
}
