//! Implementation of the `cdstage list` command.

use anyhow::{Context, Result};

use cdstage_lib::image::ImageIndex;

use crate::output::{OutputFormat, Status, field, format_timestamp, print_json};

pub fn cmd_list(output: OutputFormat) -> Result<()> {
  let entries = ImageIndex::default_index()
    .entries()
    .context("Failed to read image index")?;

  if output.is_json() {
    return print_json(&entries);
  }

  if entries.is_empty() {
    Status::Info.print("No images built yet");
    return Ok(());
  }

  for entry in entries.iter().rev() {
    Status::Info.print(&format!("{} {}", entry.profile, entry.image.short()));
    field("Base layer", entry.base_layer.short());
    field("Built", &format_timestamp(entry.built_at));
    field("Context", &entry.context.display().to_string());
  }

  Ok(())
}
