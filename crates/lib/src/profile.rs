//! Deployable profiles.
//!
//! A profile is one of the two leaf stages derived from the shared base.
//! Everything that differs between development and production images is
//! derived from the variant here, so callers never branch on strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The two deployable targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
  Development,
  Production,
}

/// Where the application code comes from at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodePolicy {
  /// Code is supplied when the container starts (e.g. a mounted directory).
  External,
  /// Code is copied into the image at build time.
  Embedded,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
  #[error("unknown profile '{0}': expected 'development' or 'production'")]
  Unknown(String),

  #[error("'base' is not a deployable target: it has no start command")]
  NotDeployable,
}

impl Profile {
  pub const ALL: [Profile; 2] = [Profile::Development, Profile::Production];

  pub fn as_str(&self) -> &'static str {
    match self {
      Profile::Development => "development",
      Profile::Production => "production",
    }
  }

  /// Whether the server restarts on source changes.
  pub fn reload(&self) -> bool {
    matches!(self, Profile::Development)
  }

  pub fn code_policy(&self) -> CodePolicy {
    match self {
      Profile::Development => CodePolicy::External,
      Profile::Production => CodePolicy::Embedded,
    }
  }
}

impl fmt::Display for Profile {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Profile {
  type Err = ProfileError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "development" | "dev" => Ok(Profile::Development),
      "production" | "prod" => Ok(Profile::Production),
      "base" => Err(ProfileError::NotDeployable),
      other => Err(ProfileError::Unknown(other.to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_canonical_names_and_short_forms() {
    assert_eq!("development".parse::<Profile>(), Ok(Profile::Development));
    assert_eq!("Production".parse::<Profile>(), Ok(Profile::Production));
    assert_eq!("dev".parse::<Profile>(), Ok(Profile::Development));
    assert_eq!("prod".parse::<Profile>(), Ok(Profile::Production));
  }

  #[test]
  fn base_is_rejected_as_target() {
    assert_eq!("base".parse::<Profile>(), Err(ProfileError::NotDeployable));
  }

  #[test]
  fn unknown_name_is_rejected() {
    assert_eq!(
      "staging".parse::<Profile>(),
      Err(ProfileError::Unknown("staging".to_string()))
    );
  }

  #[test]
  fn only_development_reloads() {
    assert!(Profile::Development.reload());
    assert!(!Profile::Production.reload());
  }

  #[test]
  fn only_production_embeds_code() {
    assert_eq!(Profile::Development.code_policy(), CodePolicy::External);
    assert_eq!(Profile::Production.code_policy(), CodePolicy::Embedded);
  }

  #[test]
  fn serializes_lowercase() {
    assert_eq!(serde_json::to_string(&Profile::Production).unwrap(), "\"production\"");
  }
}
