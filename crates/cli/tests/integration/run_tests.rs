use predicates::prelude::*;

use super::common::{MAIN_PY, TestEnv};

#[test]
fn development_without_mount_cannot_import_app() {
  let env = TestEnv::project();
  env.build("development");

  env
    .cmd()
    .args(["run", "development", "--dry-run"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("app.main:app"));
}

#[test]
fn development_with_mount_uses_reload() {
  let env = TestEnv::project();
  env.build("development");

  env
    .cmd()
    .args(["run", "development", "--dry-run", "--mount"])
    .arg(env.context_path())
    .assert()
    .success()
    .stdout(predicate::str::contains(
      "uvicorn app.main:app --host 0.0.0.0 --port 8000 --reload",
    ))
    .stdout(predicate::str::contains("environment=development"))
    .stdout(predicate::str::contains("Debug: true"));
}

#[test]
fn production_runs_embedded_code_without_reload() {
  let env = TestEnv::project();
  env.build("production");

  env
    .cmd()
    .args(["run", "production", "--dry-run"])
    .assert()
    .success()
    .stdout(predicate::str::contains(
      "uvicorn app.main:app --host 0.0.0.0 --port 8000\n",
    ))
    .stdout(predicate::str::contains("--reload").not())
    .stdout(predicate::str::contains("environment=production"));
}

#[test]
fn production_rejects_mount() {
  let env = TestEnv::project();
  env.build("production");

  env
    .cmd()
    .args(["run", "production", "--dry-run", "--mount"])
    .arg(env.context_path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("cannot take a mount"));
}

#[test]
fn production_built_without_app_fails_at_run_time() {
  let env = TestEnv::project();
  std::fs::remove_dir_all(env.context_path().join("app")).unwrap();
  env.build("production");

  env
    .cmd()
    .args(["run", "production", "--dry-run"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("cannot be imported"));
}

#[test]
fn run_before_build_fails() {
  let env = TestEnv::project();

  env
    .cmd()
    .args(["run", "production"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("No production image has been built"));
}

#[test]
fn run_uses_latest_build() {
  let env = TestEnv::project();
  env.build("production");
  env.write_file("project/app/extra.py", "VALUE = 1\n");
  env.build("production");

  env
    .cmd()
    .args(["inspect", "production"])
    .assert()
    .success()
    .stdout(predicate::str::contains("app/app/extra.py"));
}

#[cfg(unix)]
#[test]
fn server_exit_code_is_propagated() {
  let env = TestEnv::project();
  env.write_file("project/cdstage.toml", "[server]\nprogram = \"/bin/sh\"\n");
  env.build("development");

  // `/bin/sh app.main:app ...` runs this file from the mounted directory.
  env.write_file("mount/app/main.py", MAIN_PY);
  env.write_file(
    "mount/app.main:app",
    "test \"$environment\" = development && test \"$1\" = --host && exit 42\nexit 1\n",
  );

  env
    .cmd()
    .args(["run", "development", "--mount"])
    .arg(env.temp.path().join("mount"))
    .assert()
    .code(42);
}
