use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProjectConfig;
use crate::consts::{APP_MODULE, BIND_HOST, BIND_PORT, RELOAD_FLAG};
use crate::profile::Profile;
use crate::util::hash::Hashable;

/// A named build phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
  Base,
  Development,
  Production,
}

impl StageName {
  pub const ALL: [StageName; 3] = [StageName::Base, StageName::Development, StageName::Production];

  pub fn as_str(&self) -> &'static str {
    match self {
      StageName::Base => "base",
      StageName::Development => "development",
      StageName::Production => "production",
    }
  }

  /// The deployable profile this stage produces, if any.
  pub fn profile(&self) -> Option<Profile> {
    match self {
      StageName::Base => None,
      StageName::Development => Some(Profile::Development),
      StageName::Production => Some(Profile::Production),
    }
  }
}

impl From<Profile> for StageName {
  fn from(profile: Profile) -> Self {
    match profile {
      Profile::Development => StageName::Development,
      Profile::Production => StageName::Production,
    }
  }
}

impl fmt::Display for StageName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StageError {
  #[error("stage '{0}' is not a deployable target: it has no start command")]
  NotDeployable(StageName),

  #[error("stage '{0}' is not defined")]
  MissingStage(StageName),

  #[error("stage '{stage}' derives from undefined stage '{parent}'")]
  MissingParent { stage: StageName, parent: StageName },

  #[error("stage graph contains a cycle")]
  CycleDetected,

  #[error("invalid build transition: {event} from state {from}")]
  InvalidTransition { from: String, event: String },
}

/// What a stage starts from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageSource {
  /// An external image reference (e.g. `python:3.11-slim`).
  Image(String),
  /// Another stage in the same blueprint.
  Stage(StageName),
}

/// One step of a stage. Paths are relative to the working directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
  Workdir { path: String },
  /// Copy the dependency manifest from the context.
  CopyManifest { src: String, dest: String },
  /// Install every package listed in the manifest.
  InstallDependencies { manifest: String },
  /// Copy a directory tree from the context.
  CopyTree { src: String, dest: String },
  Env { key: String, value: String },
  Expose { port: u16 },
  Cmd { argv: Vec<String> },
}

/// A stage definition: source plus ordered instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDef {
  pub name: StageName,
  pub source: StageSource,
  pub instructions: Vec<Instruction>,
}

impl Hashable for StageDef {}

impl StageDef {
  pub fn parent(&self) -> Option<StageName> {
    match &self.source {
      StageSource::Stage(parent) => Some(*parent),
      StageSource::Image(_) => None,
    }
  }

  /// The start command, if this stage defines one.
  pub fn command(&self) -> Option<&[String]> {
    self.instructions.iter().rev().find_map(|i| match i {
      Instruction::Cmd { argv } => Some(argv.as_slice()),
      _ => None,
    })
  }

  pub fn env(&self) -> BTreeMap<String, String> {
    self
      .instructions
      .iter()
      .filter_map(|i| match i {
        Instruction::Env { key, value } => Some((key.clone(), value.clone())),
        _ => None,
      })
      .collect()
  }

  /// Sources of every `CopyTree` instruction.
  pub fn embedded_trees(&self) -> Vec<&str> {
    self
      .instructions
      .iter()
      .filter_map(|i| match i {
        Instruction::CopyTree { src, .. } => Some(src.as_str()),
        _ => None,
      })
      .collect()
  }
}

/// The server invocation shared by both profiles.
///
/// Only `reload` varies between profiles; host, port and module are fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartCommand {
  pub program: String,
  pub module: String,
  pub host: String,
  pub port: u16,
  pub reload: bool,
}

impl StartCommand {
  pub fn for_profile(profile: Profile, config: &ProjectConfig) -> Self {
    Self {
      program: config.server.program.clone(),
      module: APP_MODULE.to_string(),
      host: BIND_HOST.to_string(),
      port: BIND_PORT,
      reload: profile.reload(),
    }
  }

  pub fn argv(&self) -> Vec<String> {
    let mut argv = vec![
      self.program.clone(),
      self.module.clone(),
      "--host".to_string(),
      self.host.clone(),
      "--port".to_string(),
      self.port.to_string(),
    ];
    if self.reload {
      argv.push(RELOAD_FLAG.to_string());
    }
    argv
  }
}
