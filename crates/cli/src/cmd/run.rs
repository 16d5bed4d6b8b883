//! Implementation of the `cdstage run` command.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::debug;

use cdstage_lib::launch::Launcher;
use cdstage_lib::platform::paths::store_dir;
use cdstage_lib::profile::Profile;
use cdstage_lib::store_lock::{LockMode, StoreLock};

use super::latest_image;
use crate::output::{Status, field, list_item};

/// Start the latest image of `profile` and wait for the server to exit.
///
/// The store stays share-locked while the server runs so `gc` cannot
/// remove the layers it imports from. The child's exit code becomes ours.
pub fn cmd_run(profile: Profile, mount: Option<&Path>, dry_run: bool) -> Result<ExitCode> {
  let store = store_dir();
  let _lock = StoreLock::acquire(&store, LockMode::Shared, "run").context("Failed to acquire store lock")?;

  let (entry, image, _layer) = latest_image(&store, profile)?;
  debug!(image = %image.id, context = %entry.context.display(), "resolved latest image");
  let launcher = Launcher::new(&store);
  let plan = launcher
    .prepare(&image, mount)
    .with_context(|| format!("Cannot start {} image {}", profile, image.id.short()))?;

  if dry_run {
    Status::Info.print(&format!("Would start {} image {}", profile, image.id.short()));
    field("Command", &plan.argv().join(" "));
    field("Working directory", &plan.cwd.display().to_string());
    field("Debug", &plan.startup.debug().to_string());
    field("Environment", "");
    for (key, value) in &plan.env {
      list_item(&format!("{}={}", key, value));
    }
    return Ok(ExitCode::SUCCESS);
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let code = rt.block_on(launcher.run(&plan))?;
  if code != 0 {
    Status::Warning.print(&format!("server exited with code {}", code));
  }

  Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}
