//! Test helpers for cdstage-lib.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

/// A minimal valid dependency manifest.
pub const REQUIREMENTS: &str = "\
# web stack
fastapi==0.110.0
uvicorn[standard]>=0.27
python-dotenv
";

/// A minimal ASGI entry module.
pub const MAIN_PY: &str = "from fastapi import FastAPI\n\napp = FastAPI()\n";

/// Create a build context with `requirements.txt` and `app/main.py`.
pub fn build_context() -> TempDir {
  let temp = TempDir::new().unwrap();
  write_context(temp.path(), REQUIREMENTS, true);
  temp
}

/// Populate `root` as a build context.
pub fn write_context(root: &Path, requirements: &str, with_app: bool) {
  fs::write(root.join("requirements.txt"), requirements).unwrap();
  if with_app {
    fs::create_dir_all(root.join("app")).unwrap();
    fs::write(root.join("app/__init__.py"), "").unwrap();
    fs::write(root.join("app/main.py"), MAIN_PY).unwrap();
  }
}

/// Returns the shell command and args to execute a shell script.
#[cfg(unix)]
pub fn shell_cmd(script: &str) -> (String, Vec<String>) {
  ("/bin/sh".to_string(), vec!["-c".to_string(), script.to_string()])
}

#[cfg(windows)]
pub fn shell_cmd(script: &str) -> (String, Vec<String>) {
  ("cmd.exe".to_string(), vec!["/C".to_string(), script.to_string()])
}
