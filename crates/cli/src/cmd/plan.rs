//! Implementation of the `cdstage plan` command.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use cdstage_lib::blueprint::{Blueprint, ResolvedTarget};
use cdstage_lib::config::ProjectConfig;
use cdstage_lib::consts::REQUIREMENTS_FILE;
use cdstage_lib::profile::{CodePolicy, Profile};
use cdstage_lib::requirements::RequirementsManifest;
use cdstage_lib::stage::StageName;
use cdstage_lib::util::hash::{Hashable, ObjectHash};

use super::context_dir;
use crate::output::{OutputFormat, Status, field, list_item, print_json};

#[derive(Serialize)]
struct StagePlan {
  name: StageName,
  hash: ObjectHash,
}

#[derive(Serialize)]
struct PlanOutput {
  #[serde(flatten)]
  resolved: ResolvedTarget,
  stages: Vec<StagePlan>,
  packages: Vec<String>,
}

/// Resolve a profile without building anything.
///
/// The dependency manifest is validated so a plan fails exactly where a
/// build would.
pub fn cmd_plan(profile: Profile, context: &Path, output: OutputFormat) -> Result<()> {
  let context = context_dir(context)?;
  let config = ProjectConfig::load(&context).context("Failed to load project configuration")?;
  let blueprint = Blueprint::new(config);

  let resolved = blueprint.resolve(profile)?;
  let manifest =
    RequirementsManifest::load(&context.join(REQUIREMENTS_FILE)).context("Failed to resolve dependencies")?;

  let mut stages = Vec::new();
  for name in &resolved.lineage {
    stages.push(StagePlan {
      name: *name,
      hash: blueprint.stage(*name)?.compute_hash()?,
    });
  }

  let plan = PlanOutput {
    resolved,
    stages,
    packages: manifest.installed_set(),
  };

  if output.is_json() {
    return print_json(&plan);
  }

  Status::Info.print(&format!("Plan for {}", profile));
  field("Lineage", "");
  for stage in &plan.stages {
    list_item(&format!("{} ({})", stage.name, stage.hash.short()));
  }
  field("Command", &plan.resolved.command.argv().join(" "));
  for (key, value) in &plan.resolved.env {
    field("Env", &format!("{}={}", key, value));
  }
  field("Port", &plan.resolved.exposed_port.to_string());
  field("Workdir", &plan.resolved.workdir);
  field("Code", code_description(profile));
  field("Packages", &plan.packages.len().to_string());
  for package in &plan.packages {
    list_item(package);
  }

  Ok(())
}

fn code_description(profile: Profile) -> &'static str {
  match profile.code_policy() {
    CodePolicy::Embedded => "embedded at build time",
    CodePolicy::External => "supplied at run time (--mount)",
  }
}
