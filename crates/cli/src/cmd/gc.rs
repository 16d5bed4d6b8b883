use std::time::Instant;

use anyhow::{Context, Result};

use cdstage_lib::gc::collect_garbage;
use cdstage_lib::image::ImageIndex;
use cdstage_lib::platform::paths::store_dir;
use cdstage_lib::store_lock::{LockMode, StoreLock};

use crate::output::{OutputFormat, Status, field, format_bytes, format_duration, print_json};

pub fn cmd_gc(dry_run: bool, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let store = store_dir();

  let _lock = StoreLock::acquire(&store, LockMode::Exclusive, "gc").context("Failed to acquire store lock")?;

  let result = collect_garbage(&store, &ImageIndex::default_index(), dry_run)?;

  if output.is_json() {
    print_json(&result)?;
  } else {
    println!();
    if dry_run {
      Status::Info.print("Dry run - no changes made");
    } else {
      Status::Success.print("Garbage collection complete!");
    }
    field("Layers removed", &result.stats.layers_deleted.to_string());
    field("Images removed", &result.stats.images_deleted.to_string());
    field("Index entries pruned", &result.stats.index_entries_pruned.to_string());
    field("Space freed", &format_bytes(result.stats.bytes_freed));
    field("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}
