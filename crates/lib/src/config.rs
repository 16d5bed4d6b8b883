//! Project configuration (`cdstage.toml`).
//!
//! The file is optional. Every key has a default, so an empty or absent file
//! yields the standard layout. The application contract (module path, bind
//! address, manifest and code locations) is not configurable; see
//! [`crate::consts`].

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{
  DEFAULT_BASE_IMAGE, DEFAULT_INSTALLER_PROGRAM, DEFAULT_SERVER_PROGRAM, DEFAULT_WORKDIR, PROJECT_CONFIG_FILE,
};

/// Placeholder in installer args replaced by the manifest path.
pub const REQUIREMENTS_PLACEHOLDER: &str = "{requirements}";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid configuration: {0}")]
  Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
  /// Image every stage ultimately derives from.
  pub base_image: String,
  /// Working directory inside the image.
  pub workdir: String,
  pub installer: InstallerConfig,
  pub server: ServerConfig,
}

/// How the base stage installs the dependency manifest.
///
/// The install target directory is passed through the environment
/// (`PIP_TARGET` and `CDSTAGE_INSTALL_TARGET`), not through `args`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerConfig {
  pub program: String,
  pub args: Vec<String>,
}

/// The ASGI server program launched by both profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
  pub program: String,
}

impl Default for ProjectConfig {
  fn default() -> Self {
    Self {
      base_image: DEFAULT_BASE_IMAGE.to_string(),
      workdir: DEFAULT_WORKDIR.to_string(),
      installer: InstallerConfig::default(),
      server: ServerConfig::default(),
    }
  }
}

impl Default for InstallerConfig {
  fn default() -> Self {
    Self {
      program: DEFAULT_INSTALLER_PROGRAM.to_string(),
      args: ["install", "--no-cache-dir", "-r", REQUIREMENTS_PLACEHOLDER]
        .into_iter()
        .map(String::from)
        .collect(),
    }
  }
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      program: DEFAULT_SERVER_PROGRAM.to_string(),
    }
  }
}

impl ProjectConfig {
  /// Load `cdstage.toml` from a build context, falling back to defaults.
  pub fn load(context: &Path) -> Result<Self, ConfigError> {
    let path = context.join(PROJECT_CONFIG_FILE);

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "no project config, using defaults");
        return Ok(Self::default());
      }
      Err(source) => return Err(ConfigError::Read { path, source }),
    };

    let config = Self::parse(&content).map_err(|e| match e {
      ConfigError::Parse { source, .. } => ConfigError::Parse {
        path: path.clone(),
        source,
      },
      other => other,
    })?;
    debug!(path = %path.display(), "loaded project config");
    Ok(config)
  }

  pub fn parse(content: &str) -> Result<Self, ConfigError> {
    let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
      path: PathBuf::from(PROJECT_CONFIG_FILE),
      source,
    })?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<(), ConfigError> {
    if self.base_image.trim().is_empty() {
      return Err(ConfigError::Invalid("base_image must not be empty".to_string()));
    }
    if !self.workdir.starts_with('/') {
      return Err(ConfigError::Invalid(format!(
        "workdir must be an absolute path, got '{}'",
        self.workdir
      )));
    }
    if Path::new(&self.workdir).components().any(|c| c == Component::ParentDir) {
      return Err(ConfigError::Invalid(format!(
        "workdir must not contain '..', got '{}'",
        self.workdir
      )));
    }
    if self.installer.program.trim().is_empty() {
      return Err(ConfigError::Invalid("installer.program must not be empty".to_string()));
    }
    if !self.installer.args.iter().any(|a| a.contains(REQUIREMENTS_PLACEHOLDER)) {
      return Err(ConfigError::Invalid(format!(
        "installer.args must reference {}",
        REQUIREMENTS_PLACEHOLDER
      )));
    }
    if self.server.program.trim().is_empty() {
      return Err(ConfigError::Invalid("server.program must not be empty".to_string()));
    }
    Ok(())
  }
}
