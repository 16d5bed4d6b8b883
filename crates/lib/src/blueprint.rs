//! The three-stage build descriptor.
//!
//! [`Blueprint::new`] produces the shared `base` stage and calls
//! [`leaf_stage`] once per profile. Everything that differs between the
//! development and production images is decided in `leaf_stage` from the
//! profile variant.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{ProjectConfig, REQUIREMENTS_PLACEHOLDER};
use crate::consts::{APP_DIR, BIND_PORT, ENVIRONMENT_VAR, REQUIREMENTS_FILE};
use crate::profile::{CodePolicy, Profile};
use crate::stage::{Instruction, StageDef, StageError, StageGraph, StageName, StageSource, StartCommand};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blueprint {
  config: ProjectConfig,
  stages: BTreeMap<StageName, StageDef>,
}

/// What a profile resolves to before anything is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTarget {
  pub profile: Profile,
  pub lineage: Vec<StageName>,
  pub code_policy: CodePolicy,
  pub command: StartCommand,
  pub env: BTreeMap<String, String>,
  pub exposed_port: u16,
  pub workdir: String,
}

impl Blueprint {
  pub fn new(config: ProjectConfig) -> Self {
    let mut stages = BTreeMap::new();
    stages.insert(StageName::Base, base_stage(&config));
    for profile in Profile::ALL {
      stages.insert(StageName::from(profile), leaf_stage(profile, &config));
    }
    Self { config, stages }
  }

  pub fn config(&self) -> &ProjectConfig {
    &self.config
  }

  pub fn stages(&self) -> &BTreeMap<StageName, StageDef> {
    &self.stages
  }

  pub fn stage(&self, name: StageName) -> Result<&StageDef, StageError> {
    self.stages.get(&name).ok_or(StageError::MissingStage(name))
  }

  pub fn leaf(&self, profile: Profile) -> Result<&StageDef, StageError> {
    self.stage(StageName::from(profile))
  }

  pub fn graph(&self) -> Result<StageGraph, StageError> {
    StageGraph::from_stages(&self.stages)
  }

  /// Resolve a profile to its lineage, command and environment.
  pub fn resolve(&self, profile: Profile) -> Result<ResolvedTarget, StageError> {
    let lineage = self.graph()?.deployable_lineage(StageName::from(profile))?;

    let mut env = BTreeMap::new();
    for name in &lineage {
      env.extend(self.stage(*name)?.env());
    }

    Ok(ResolvedTarget {
      profile,
      lineage,
      code_policy: profile.code_policy(),
      command: StartCommand::for_profile(profile, &self.config),
      env,
      exposed_port: BIND_PORT,
      workdir: self.config.workdir.clone(),
    })
  }
}

/// The shared dependency stage.
pub fn base_stage(config: &ProjectConfig) -> StageDef {
  StageDef {
    name: StageName::Base,
    source: StageSource::Image(config.base_image.clone()),
    instructions: vec![
      Instruction::Workdir {
        path: config.workdir.clone(),
      },
      Instruction::CopyManifest {
        src: REQUIREMENTS_FILE.to_string(),
        dest: ".".to_string(),
      },
      Instruction::InstallDependencies {
        manifest: REQUIREMENTS_FILE.to_string(),
      },
    ],
  }
}

/// Map a profile to its stage: code inclusion, environment and command.
pub fn leaf_stage(profile: Profile, config: &ProjectConfig) -> StageDef {
  let mut instructions = Vec::new();

  if profile.code_policy() == CodePolicy::Embedded {
    instructions.push(Instruction::CopyTree {
      src: APP_DIR.to_string(),
      dest: format!("./{}", APP_DIR),
    });
  }

  instructions.push(Instruction::Env {
    key: ENVIRONMENT_VAR.to_string(),
    value: profile.as_str().to_string(),
  });
  instructions.push(Instruction::Expose { port: BIND_PORT });
  instructions.push(Instruction::Cmd {
    argv: StartCommand::for_profile(profile, config).argv(),
  });

  StageDef {
    name: StageName::from(profile),
    source: StageSource::Stage(StageName::Base),
    instructions,
  }
}

/// Installer argv with the manifest placeholder replaced by `manifest`.
pub fn installer_argv(config: &ProjectConfig, manifest: &str) -> Vec<String> {
  std::iter::once(config.installer.program.clone())
    .chain(
      config
        .installer
        .args
        .iter()
        .map(|arg| arg.replace(REQUIREMENTS_PLACEHOLDER, manifest)),
    )
    .collect()
}
