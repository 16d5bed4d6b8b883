//! Installer backed by an external program.

use tokio::process::Command;
use tracing::{debug, info};

use super::{INSTALL_TARGET_ENV, InstallError, InstallRequest, Installer, InstallerIdentity};
use crate::config::{ProjectConfig, REQUIREMENTS_PLACEHOLDER};

/// Longest stderr tail kept in an error.
const STDERR_TAIL: usize = 2000;

/// Runs the configured installer program.
///
/// The process gets a cleared environment: `PATH` is passed through so the
/// installer can be found, `HOME` points into the install target's parent,
/// and `SOURCE_DATE_EPOCH` is fixed for reproducible bytecode and metadata.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
  program: String,
  args: Vec<String>,
}

impl CommandInstaller {
  pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
    Self {
      program: program.into(),
      args,
    }
  }

  pub fn from_config(config: &ProjectConfig) -> Self {
    Self::new(config.installer.program.clone(), config.installer.args.clone())
  }
}

impl Installer for CommandInstaller {
  fn identity(&self) -> InstallerIdentity {
    InstallerIdentity {
      kind: "command",
      argv: std::iter::once(self.program.clone()).chain(self.args.iter().cloned()).collect(),
    }
  }

  async fn install(&self, request: &InstallRequest<'_>) -> Result<(), InstallError> {
    let manifest_path = request.manifest_path.to_string_lossy();
    let args: Vec<String> = self
      .args
      .iter()
      .map(|a| a.replace(REQUIREMENTS_PLACEHOLDER, &manifest_path))
      .collect();

    info!(program = %self.program, packages = request.manifest.len(), "installing dependencies");

    let home = request.target.parent().unwrap_or(request.target);
    let mut command = Command::new(&self.program);
    command
      .args(&args)
      .current_dir(request.workdir)
      .env_clear()
      .env("HOME", home)
      .env("LANG", "C.UTF-8")
      .env("PIP_TARGET", request.target)
      .env("PIP_DISABLE_PIP_VERSION_CHECK", "1")
      .env("PYTHONDONTWRITEBYTECODE", "1")
      .env(INSTALL_TARGET_ENV, request.target)
      // 1980-01-01, the ZIP epoch
      .env("SOURCE_DATE_EPOCH", "315532800");

    if let Some(path) = std::env::var_os("PATH") {
      command.env("PATH", path);
    }

    debug!(args = ?args, workdir = %request.workdir.display(), "spawning installer");

    let output = command.output().await.map_err(|source| InstallError::Spawn {
      program: self.program.clone(),
      source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
      debug!(stdout = %stdout.trim(), "installer output");
    }

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      let stderr = stderr.trim();
      let start = stderr
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map(|(i, _)| i)
        .unwrap_or(0);
      return Err(InstallError::Failed {
        program: self.program.clone(),
        code: output.status.code(),
        stderr: stderr[start..].to_string(),
      });
    }

    Ok(())
  }
}
