//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

pub const REQUIREMENTS: &str = "fastapi==0.110.0\nuvicorn[standard]>=0.27\npython-dotenv\n";

pub const MAIN_PY: &str = "from fastapi import FastAPI\n\napp = FastAPI()\n";

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the build context,
/// the store and the data directory (image index).
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// A build context with `requirements.txt` and `app/main.py`.
  pub fn project() -> Self {
    let env = Self::empty();
    env.write_file("project/requirements.txt", REQUIREMENTS);
    env.write_file("project/app/__init__.py", "");
    env.write_file("project/app/main.py", MAIN_PY);
    env
  }

  /// An empty build context.
  pub fn empty() -> Self {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("project")).unwrap();
    Self { temp }
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  fn dir(&self, name: &str) -> PathBuf {
    let p = self.temp.path().join(name);
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Build context path.
  pub fn context_path(&self) -> PathBuf {
    self.dir("project")
  }

  /// Store path (isolated per test).
  pub fn store_path(&self) -> PathBuf {
    self.dir("store")
  }

  /// Data path for the image index.
  pub fn data_path(&self) -> PathBuf {
    self.dir("data")
  }

  /// Get a pre-configured Command for the cdstage binary.
  ///
  /// Sets environment variables for isolated testing:
  /// - `CDSTAGE_STORE`: Isolated store path
  /// - `XDG_DATA_HOME`: Isolated data path (for the image index)
  /// - `APPDATA`: Isolated data path (for Windows)
  pub fn cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("cdstage");
    cmd.env("CDSTAGE_STORE", self.store_path());
    cmd.env("XDG_DATA_HOME", self.data_path());
    cmd.env("APPDATA", self.data_path());
    cmd.env_remove("RUST_LOG");
    cmd
  }

  /// `cdstage build <target> -C <context> --installer record`, asserted to succeed.
  pub fn build(&self, target: &str) {
    self
      .cmd()
      .args(["build", target, "--installer", "record", "-C"])
      .arg(self.context_path())
      .assert()
      .success();
  }
}
