//! Starting a built image's server process.
//!
//! [`StartupConfig`] is read once from the image environment.
//! [`Launcher::prepare`] checks that the image and its base layer are intact,
//! that the startup environment agrees with the image profile, and that the
//! application entry point exists where the profile says code lives.
//! [`Launcher::run`] then spawns the start command.

mod launcher;
mod startup;

pub use launcher::{LaunchPlan, Launcher};
pub use startup::{DEBUG_VAR, StartupConfig};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::profile::{Profile, ProfileError};

#[derive(Debug, Error)]
pub enum LaunchError {
  #[error("invalid environment value '{value}': {source}")]
  InvalidEnvironment {
    value: String,
    #[source]
    source: ProfileError,
  },

  #[error("application object {module} cannot be imported: {} not found", path.display())]
  MissingApplication { path: PathBuf, module: &'static str },

  #[error("image was built for {image} but its environment selects {startup}")]
  EnvironmentMismatch { image: Profile, startup: Profile },

  #[error("{0} images embed their code and cannot take a mount")]
  MountRejected(Profile),

  #[error("mount directory {} does not exist", .0.display())]
  MountMissing(PathBuf),

  #[error("store entry {} is missing or incomplete; rebuild the image", .0.display())]
  IncompleteEntry(PathBuf),

  #[error("image has no start command")]
  NoCommand,

  #[error("invalid search path: {0}")]
  InvalidPath(String),

  #[error("failed to start '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("io error at {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}
