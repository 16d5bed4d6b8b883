use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn build_production_with_record_installer() {
  let env = TestEnv::project();

  env
    .cmd()
    .args(["build", "production", "--installer", "record", "-C"])
    .arg(env.context_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("Built production image"))
    .stdout(predicate::str::contains("Embedded files: 2"));
}

#[test]
fn build_all_shares_base_layer() {
  let env = TestEnv::project();

  let output = env
    .cmd()
    .args(["build", "all", "--installer", "record", "-o", "json", "-C"])
    .arg(env.context_path())
    .output()
    .unwrap();
  assert!(output.status.success());

  let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let images = summary["images"].as_array().unwrap();
  assert_eq!(images.len(), 2);
  assert_eq!(images[0]["profile"], "development");
  assert_eq!(images[0]["state"], "dev_ready");
  assert_eq!(images[1]["profile"], "production");
  assert_eq!(images[1]["state"], "prod_ready");
  assert_eq!(images[0]["base_layer"], images[1]["base_layer"]);
  assert_eq!(images[0]["embedded_files"], 0);
  assert_eq!(images[0]["packages"].as_array().unwrap().len(), 3);
}

#[test]
fn rebuild_is_cached() {
  let env = TestEnv::project();
  env.build("development");

  env
    .cmd()
    .args(["build", "development", "--installer", "record", "-C"])
    .arg(env.context_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("(cached)"));
}

#[test]
fn missing_requirements_fails_build() {
  let env = TestEnv::empty();
  env.write_file("project/app/main.py", "app = None\n");

  env
    .cmd()
    .args(["build", "all", "--installer", "record", "-C"])
    .arg(env.context_path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("requirements.txt"));

  env
    .cmd()
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("No images built yet"));
}

#[test]
fn malformed_requirements_fails_build() {
  let env = TestEnv::project();
  env.write_file("project/requirements.txt", "fastapi==\n");

  env
    .cmd()
    .args(["build", "production", "--installer", "record", "-C"])
    .arg(env.context_path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("line 1"));
}

#[cfg(unix)]
#[test]
fn failing_installer_fails_build() {
  let env = TestEnv::project();
  env.write_file(
    "project/cdstage.toml",
    r#"
[installer]
program = "/bin/sh"
args = ["-c", "echo 'could not resolve fastapi' >&2; exit 3", "installer", "{requirements}"]
"#,
  );

  env
    .cmd()
    .args(["build", "production", "-C"])
    .arg(env.context_path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("could not resolve fastapi"));

  env
    .cmd()
    .args(["list", "-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::diff("[]\n"));
}

#[cfg(unix)]
#[test]
fn command_installer_installs_into_layer() {
  let env = TestEnv::project();
  env.write_file(
    "project/cdstage.toml",
    r#"
[installer]
program = "/bin/sh"
args = ["-c", "cp \"$1\" \"$PIP_TARGET/installed.txt\"", "installer", "{requirements}"]
"#,
  );

  let output = env
    .cmd()
    .args(["build", "development", "-o", "json", "-C"])
    .arg(env.context_path())
    .output()
    .unwrap();
  assert!(output.status.success());

  let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let base = summary["images"][0]["base_layer"].as_str().unwrap();
  let installed = env
    .store_path()
    .join("layer")
    .join(base)
    .join("rootfs/site-packages/installed.txt");
  assert!(installed.exists());
}

#[test]
fn base_is_not_a_build_target() {
  let env = TestEnv::project();

  env
    .cmd()
    .args(["build", "base", "-C"])
    .arg(env.context_path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid value 'base'"));
}

#[test]
fn plan_development_shows_reload_and_environment() {
  let env = TestEnv::project();

  env
    .cmd()
    .args(["plan", "development", "-C"])
    .arg(env.context_path())
    .assert()
    .success()
    .stdout(predicate::str::contains(
      "uvicorn app.main:app --host 0.0.0.0 --port 8000 --reload",
    ))
    .stdout(predicate::str::contains("environment=development"))
    .stdout(predicate::str::contains("supplied at run time"));
}

#[test]
fn plan_production_json() {
  let env = TestEnv::project();

  let output = env
    .cmd()
    .args(["plan", "production", "-o", "json", "-C"])
    .arg(env.context_path())
    .output()
    .unwrap();
  assert!(output.status.success());

  let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(plan["profile"], "production");
  assert_eq!(plan["command"]["reload"], false);
  assert_eq!(plan["env"]["environment"], "production");
  assert_eq!(plan["exposed_port"], 8000);
  assert_eq!(plan["lineage"], serde_json::json!(["base", "production"]));
  assert_eq!(plan["stages"].as_array().unwrap().len(), 2);
}

#[test]
fn plan_rejects_base() {
  let env = TestEnv::project();

  env
    .cmd()
    .args(["plan", "base", "-C"])
    .arg(env.context_path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("not a deployable target"));
}

#[test]
fn dockerfile_renders_three_stages() {
  let env = TestEnv::project();

  env
    .cmd()
    .args(["dockerfile", "-C"])
    .arg(env.context_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("FROM python:3.11-slim AS base"))
    .stdout(predicate::str::contains("FROM base AS development"))
    .stdout(predicate::str::contains("FROM base AS production"))
    .stdout(predicate::str::contains("COPY app ./app"));
}

#[test]
fn dockerfile_honors_project_config() {
  let env = TestEnv::project();
  env.write_file("project/cdstage.toml", "base_image = \"python:3.12-slim\"\n");
  let out = env.temp.path().join("Dockerfile");

  env
    .cmd()
    .args(["dockerfile", "--output"])
    .arg(&out)
    .arg("-C")
    .arg(env.context_path())
    .assert()
    .success();

  let rendered = std::fs::read_to_string(out).unwrap();
  assert!(rendered.contains("FROM python:3.12-slim AS base"));
}

#[test]
fn list_shows_built_images() {
  let env = TestEnv::project();
  env.build("all");

  env
    .cmd()
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("development"))
    .stdout(predicate::str::contains("production"));
}

#[test]
fn inspect_lists_embedded_files() {
  let env = TestEnv::project();
  env.build("production");

  env
    .cmd()
    .args(["inspect", "production"])
    .assert()
    .success()
    .stdout(predicate::str::contains("app/app/main.py"))
    .stdout(predicate::str::contains("environment=production"))
    .stdout(predicate::str::contains("fastapi==0.110.0"));
}
