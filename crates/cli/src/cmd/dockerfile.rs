//! Implementation of the `cdstage dockerfile` command.

use std::path::Path;

use anyhow::{Context, Result};

use cdstage_lib::blueprint::Blueprint;
use cdstage_lib::config::ProjectConfig;
use cdstage_lib::dockerfile::render_dockerfile;

use super::context_dir;
use crate::output::Status;

/// Render the blueprint as a multi-stage Dockerfile, to stdout or `output`.
pub fn cmd_dockerfile(context: &Path, output: Option<&Path>) -> Result<()> {
  let context = context_dir(context)?;
  let config = ProjectConfig::load(&context).context("Failed to load project configuration")?;
  let rendered = render_dockerfile(&Blueprint::new(config))?;

  match output {
    Some(path) => {
      std::fs::write(path, &rendered).with_context(|| format!("Failed to write {}", path.display()))?;
      Status::Success.print(&format!("Wrote {}", path.display()));
    }
    None => print!("{}", rendered),
  }

  Ok(())
}
