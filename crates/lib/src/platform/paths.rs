//! Directory resolution for the store, image index and configuration.
//!
//! ```text
//! {data_dir}/
//! ├── store/                 # default store (override with CDSTAGE_STORE)
//! │   ├── layer/<hash>/      # base layers (installed dependencies)
//! │   ├── image/<hash>/      # profile images
//! │   └── .lock
//! └── images/index.json      # ImageIndex
//! ```

use std::path::PathBuf;

use crate::consts::APP_NAME;

/// Environment variable overriding the store location.
pub const STORE_ENV: &str = "CDSTAGE_STORE";

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the directory for data files for the application
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  std::env::var("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join("AppData").join("Roaming"))
    .join(APP_NAME)
}

/// Returns the directory for data files for the application
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Returns the content-addressed store directory.
///
/// `CDSTAGE_STORE` wins over the data directory default.
pub fn store_dir() -> PathBuf {
  match std::env::var(STORE_ENV) {
    Ok(path) if !path.is_empty() => PathBuf::from(path),
    _ => data_dir().join("store"),
  }
}

/// Returns the directory holding the image index.
pub fn images_dir() -> PathBuf {
  data_dir().join("images")
}

#[cfg(test)]
#[cfg(not(windows))]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn store_env_takes_precedence() {
    temp_env::with_vars(
      [
        (STORE_ENV, Some("/custom/store")),
        ("XDG_DATA_HOME", Some("/custom/data")),
      ],
      || {
        assert_eq!(store_dir(), PathBuf::from("/custom/store"));
      },
    );
  }

  #[test]
  #[serial]
  fn store_defaults_under_data_dir() {
    temp_env::with_vars(
      [
        (STORE_ENV, None::<&str>),
        ("XDG_DATA_HOME", Some("/custom/data")),
      ],
      || {
        assert_eq!(store_dir(), PathBuf::from("/custom/data/cdstage/store"));
        assert_eq!(images_dir(), PathBuf::from("/custom/data/cdstage/images"));
      },
    );
  }

  #[test]
  #[serial]
  fn xdg_fallback_to_home_directories() {
    temp_env::with_vars(
      [
        (STORE_ENV, None::<&str>),
        ("XDG_DATA_HOME", None::<&str>),
        ("HOME", Some("/home/user")),
      ],
      || {
        assert_eq!(data_dir(), PathBuf::from("/home/user/.local/share").join(APP_NAME));
      },
    );
  }
}
