//! Build-time state machine.
//!
//! ```text
//! Unresolved ──install──▶ DependenciesInstalled ──finish(dev)──▶ DevReady
//!                                    └──────────finish(prod)──▶ ProdReady
//! ```
//!
//! Installing dependencies happens at most once per build invocation. The
//! two leaf transitions both start from `DependenciesInstalled`; the
//! terminal states are final.

use std::fmt;

use serde::Serialize;

use super::types::StageError;
use crate::profile::Profile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
  Unresolved,
  DependenciesInstalled,
  DevReady,
  ProdReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildEvent {
  InstallDependencies,
  Finish(Profile),
}

impl BuildState {
  pub fn advance(self, event: BuildEvent) -> Result<BuildState, StageError> {
    match (self, event) {
      (BuildState::Unresolved, BuildEvent::InstallDependencies) => Ok(BuildState::DependenciesInstalled),
      (BuildState::DependenciesInstalled, BuildEvent::Finish(Profile::Development)) => Ok(BuildState::DevReady),
      (BuildState::DependenciesInstalled, BuildEvent::Finish(Profile::Production)) => Ok(BuildState::ProdReady),
      (from, event) => Err(StageError::InvalidTransition {
        from: from.to_string(),
        event: event.to_string(),
      }),
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, BuildState::DevReady | BuildState::ProdReady)
  }
}

impl fmt::Display for BuildState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      BuildState::Unresolved => "unresolved",
      BuildState::DependenciesInstalled => "dependencies_installed",
      BuildState::DevReady => "dev_ready",
      BuildState::ProdReady => "prod_ready",
    };
    f.write_str(s)
  }
}

impl fmt::Display for BuildEvent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildEvent::InstallDependencies => f.write_str("install_dependencies"),
      BuildEvent::Finish(profile) => write!(f, "finish({})", profile),
    }
  }
}
