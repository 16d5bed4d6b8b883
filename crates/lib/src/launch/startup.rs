use std::str::FromStr;

use serde::Serialize;

use super::LaunchError;
use crate::consts::ENVIRONMENT_VAR;
use crate::profile::Profile;

pub const DEBUG_VAR: &str = "DEBUG";

/// Settings the application reads once at startup. Never mutated after
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartupConfig {
  profile: Profile,
  debug: bool,
}

impl StartupConfig {
  /// Build from an explicit variable set. Missing `environment` means
  /// development; missing `DEBUG` means true.
  pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Result<Self, LaunchError>
  where
    K: AsRef<str>,
    V: AsRef<str>,
  {
    let mut profile = Profile::Development;
    let mut debug = true;

    for (key, value) in vars {
      let value = value.as_ref();
      match key.as_ref() {
        ENVIRONMENT_VAR => {
          profile = Profile::from_str(value).map_err(|source| LaunchError::InvalidEnvironment {
            value: value.to_string(),
            source,
          })?;
        }
        DEBUG_VAR => debug = parse_flag(value),
        _ => {}
      }
    }

    Ok(Self { profile, debug })
  }

  /// Build from the current process environment.
  pub fn from_env() -> Result<Self, LaunchError> {
    Self::from_vars(std::env::vars())
  }

  pub fn profile(&self) -> Profile {
    self.profile
  }

  pub fn debug(&self) -> bool {
    self.debug
  }
}

fn parse_flag(value: &str) -> bool {
  matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  fn defaults_to_development_with_debug() {
    let config = StartupConfig::from_vars(Vec::<(String, String)>::new()).unwrap();
    assert_eq!(config.profile(), Profile::Development);
    assert!(config.debug());
  }

  #[test]
  fn reads_environment_and_debug() {
    let config = StartupConfig::from_vars([("environment", "production"), ("DEBUG", "false")]).unwrap();
    assert_eq!(config.profile(), Profile::Production);
    assert!(!config.debug());
  }

  #[test]
  fn debug_flag_is_case_insensitive() {
    for value in ["TRUE", "1", "Yes"] {
      assert!(StartupConfig::from_vars([("DEBUG", value)]).unwrap().debug());
    }
    for value in ["0", "no", ""] {
      assert!(!StartupConfig::from_vars([("DEBUG", value)]).unwrap().debug());
    }
  }

  #[test]
  fn unknown_environment_is_an_error() {
    let err = StartupConfig::from_vars([("environment", "staging")]).unwrap_err();
    assert!(matches!(err, LaunchError::InvalidEnvironment { .. }));
    assert!(err.to_string().contains("staging"));
  }

  #[test]
  fn base_is_not_a_startup_environment() {
    assert!(StartupConfig::from_vars([("environment", "base")]).is_err());
  }

  #[test]
  #[serial]
  fn from_env_reads_process_environment() {
    temp_env::with_vars([("environment", Some("production")), ("DEBUG", Some("no"))], || {
      let config = StartupConfig::from_env().unwrap();
      assert_eq!(config.profile(), Profile::Production);
      assert!(!config.debug());
    });
  }
}
