use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{LaunchError, StartupConfig};
use crate::consts::{APP_DIR, APP_ENTRY_FILE, APP_MODULE, SITE_PACKAGES_DIR};
use crate::image::ImageRecord;
use crate::image::store::{image_path, in_rootfs, is_complete, layer_path, rootfs};
use crate::platform::paths::store_dir;
use crate::profile::{CodePolicy, Profile};
use crate::util::hash::ObjectHash;

/// Everything needed to start one server process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchPlan {
  pub image: ObjectHash,
  pub profile: Profile,
  pub program: String,
  pub args: Vec<String>,
  pub env: BTreeMap<String, String>,
  /// Working directory of the process.
  pub cwd: PathBuf,
  /// Directory the application package is imported from.
  pub code_dir: PathBuf,
  pub startup: StartupConfig,
}

impl LaunchPlan {
  pub fn argv(&self) -> Vec<String> {
    std::iter::once(self.program.clone()).chain(self.args.iter().cloned()).collect()
  }
}

pub struct Launcher {
  store: PathBuf,
}

impl Default for Launcher {
  fn default() -> Self {
    Self::new(store_dir())
  }
}

impl Launcher {
  pub fn new(store: impl Into<PathBuf>) -> Self {
    Self { store: store.into() }
  }

  /// Resolve an image into a launch plan.
  ///
  /// Production images run their embedded code and refuse a mount.
  /// Development images carry no code, so `mount` supplies it; without one
  /// the image's own working directory is used, which has no application.
  pub fn prepare(&self, image: &ImageRecord, mount: Option<&Path>) -> Result<LaunchPlan, LaunchError> {
    let image_dir = image_path(&self.store, &image.id);
    if !is_complete(&image_dir) {
      return Err(LaunchError::IncompleteEntry(image_dir));
    }
    let layer_dir = layer_path(&self.store, &image.base_layer);
    if !is_complete(&layer_dir) {
      return Err(LaunchError::IncompleteEntry(layer_dir));
    }

    let startup = StartupConfig::from_vars(&image.config.env)?;
    if startup.profile() != image.profile {
      return Err(LaunchError::EnvironmentMismatch {
        image: image.profile,
        startup: startup.profile(),
      });
    }

    let embedded =
      in_rootfs(&rootfs(&image_dir), &image.config.working_dir).map_err(|e| LaunchError::InvalidPath(e.to_string()))?;
    let code_dir = match (image.profile.code_policy(), mount) {
      (CodePolicy::Embedded, Some(_)) => return Err(LaunchError::MountRejected(image.profile)),
      (CodePolicy::Embedded, None) => embedded,
      (CodePolicy::External, Some(dir)) => {
        if !dir.is_dir() {
          return Err(LaunchError::MountMissing(dir.to_path_buf()));
        }
        std::path::absolute(dir).map_err(|source| LaunchError::Io {
          path: dir.to_path_buf(),
          source,
        })?
      }
      (CodePolicy::External, None) => embedded,
    };

    let entry = code_dir.join(APP_DIR).join(APP_ENTRY_FILE);
    if !entry.is_file() {
      return Err(LaunchError::MissingApplication {
        path: entry,
        module: APP_MODULE,
      });
    }

    let (program, args) = image.config.cmd.split_first().ok_or(LaunchError::NoCommand)?;
    let site_packages =
      in_rootfs(&rootfs(&layer_dir), SITE_PACKAGES_DIR).map_err(|e| LaunchError::InvalidPath(e.to_string()))?;
    let env = process_env(&image.config.env, &code_dir, &site_packages)?;

    debug!(image = %image.id, code_dir = ?code_dir, "prepared launch plan");

    Ok(LaunchPlan {
      image: image.id.clone(),
      profile: image.profile,
      program: program.clone(),
      args: args.to_vec(),
      env,
      cwd: code_dir.clone(),
      code_dir,
      startup,
    })
  }

  /// Start the server and wait for it. Returns the child's exit code.
  pub async fn run(&self, plan: &LaunchPlan) -> Result<i32, LaunchError> {
    info!(
      profile = %plan.profile,
      program = %plan.program,
      cwd = ?plan.cwd,
      debug = plan.startup.debug(),
      "starting server"
    );

    let mut command = Command::new(&plan.program);
    command.args(&plan.args).current_dir(&plan.cwd).env_clear().envs(&plan.env);

    let status = command.status().await.map_err(|source| LaunchError::Spawn {
      program: plan.program.clone(),
      source,
    })?;

    match status.code() {
      Some(code) => {
        debug!(code, "server exited");
        Ok(code)
      }
      None => {
        warn!("server terminated by signal");
        Ok(1)
      }
    }
  }
}

/// Image environment plus the variables that make the layers importable.
fn process_env(
  image_env: &BTreeMap<String, String>,
  code_dir: &Path,
  site_packages: &Path,
) -> Result<BTreeMap<String, String>, LaunchError> {
  let mut env = image_env.clone();

  let python_path = env::join_paths([code_dir, site_packages]).map_err(|e| LaunchError::InvalidPath(e.to_string()))?;
  env.insert("PYTHONPATH".to_string(), lossy(python_path));

  let mut path_entries = vec![site_packages.join("bin")];
  if let Some(host_path) = env::var_os("PATH") {
    path_entries.extend(env::split_paths(&host_path));
  }
  let path = env::join_paths(path_entries).map_err(|e| LaunchError::InvalidPath(e.to_string()))?;
  env.insert("PATH".to_string(), lossy(path));

  for key in ["HOME", "LANG", "SYSTEMROOT"] {
    if let Ok(value) = env::var(key) {
      env.entry(key.to_string()).or_insert(value);
    }
  }

  Ok(env)
}

fn lossy(value: OsString) -> String {
  value.to_string_lossy().into_owned()
}
