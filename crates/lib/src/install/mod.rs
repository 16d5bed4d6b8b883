//! Dependency installation for the base layer.
//!
//! The builder hands an [`Installer`] the copied manifest and a target
//! directory inside the layer being assembled. Two implementations exist:
//!
//! - [`CommandInstaller`] runs the configured installer program (pip by
//!   default) with a scrubbed environment.
//! - [`RecordInstaller`] installs nothing. The layer still records the
//!   validated package set, which is enough for planning and CI checks on
//!   machines without a Python toolchain.

mod command;

pub use command::CommandInstaller;

use std::future::Future;
use std::io;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::requirements::RequirementsManifest;

/// Environment variable naming the install target, set for every installer.
pub const INSTALL_TARGET_ENV: &str = "CDSTAGE_INSTALL_TARGET";

#[derive(Debug, Error)]
pub enum InstallError {
  #[error("failed to start installer '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("installer '{program}' failed with exit code {code:?}{}", format_stderr(.stderr))]
  Failed {
    program: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("io error: {0}")]
  Io(#[from] io::Error),
}

fn format_stderr(stderr: &str) -> String {
  if stderr.is_empty() {
    String::new()
  } else {
    format!(": {}", stderr)
  }
}

/// Inputs for one installation.
pub struct InstallRequest<'a> {
  pub manifest: &'a RequirementsManifest,
  /// The manifest copy inside the layer.
  pub manifest_path: &'a Path,
  /// Directory packages must be installed into.
  pub target: &'a Path,
  /// Working directory for the installer process.
  pub workdir: &'a Path,
}

/// Identity of an installer, folded into the base layer hash so switching
/// installers never reuses a layer built by another one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallerIdentity {
  pub kind: &'static str,
  pub argv: Vec<String>,
}

pub trait Installer {
  fn identity(&self) -> InstallerIdentity;

  fn install(&self, request: &InstallRequest<'_>) -> impl Future<Output = Result<(), InstallError>> + Send;
}

/// Validates and records the package set without installing anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordInstaller;

impl Installer for RecordInstaller {
  fn identity(&self) -> InstallerIdentity {
    InstallerIdentity {
      kind: "record",
      argv: Vec::new(),
    }
  }

  async fn install(&self, request: &InstallRequest<'_>) -> Result<(), InstallError> {
    debug!(
      packages = request.manifest.len(),
      target = %request.target.display(),
      "recording dependency set without installing"
    );
    Ok(())
  }
}
