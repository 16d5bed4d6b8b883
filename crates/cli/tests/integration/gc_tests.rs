use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn gc_with_no_store_succeeds() {
  let env = TestEnv::empty();

  env
    .cmd()
    .arg("gc")
    .assert()
    .success()
    .stdout(predicate::str::contains("Garbage collection complete"));
}

#[test]
fn gc_dry_run_shows_what_would_be_removed() {
  let env = TestEnv::empty();

  env
    .cmd()
    .args(["gc", "--dry-run"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Dry run"));
}

#[test]
fn gc_json_output_is_valid() {
  let env = TestEnv::empty();

  env
    .cmd()
    .args(["gc", "-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("layers_deleted"))
    .stdout(predicate::str::contains("images_deleted"))
    .stdout(predicate::str::contains("deleted_paths"));
}

#[test]
fn gc_keeps_indexed_images() {
  let env = TestEnv::project();
  env.build("all");

  env
    .cmd()
    .arg("gc")
    .assert()
    .success()
    .stdout(predicate::str::contains("Layers removed: 0"))
    .stdout(predicate::str::contains("Images removed: 0"));

  env.cmd().args(["run", "production", "--dry-run"]).assert().success();
}

#[test]
fn gc_removes_superseded_image_and_layer() {
  let env = TestEnv::project();
  env.build("development");
  env.write_file("project/requirements.txt", "fastapi==0.111.0\n");
  env.build("development");

  env
    .cmd()
    .arg("gc")
    .assert()
    .success()
    .stdout(predicate::str::contains("Layers removed: 1"))
    .stdout(predicate::str::contains("Images removed: 1"))
    .stdout(predicate::str::contains("Index entries pruned: 0"));

  let layers = std::fs::read_dir(env.store_path().join("layer")).unwrap().count();
  let images = std::fs::read_dir(env.store_path().join("image")).unwrap().count();
  assert_eq!(layers, 1);
  assert_eq!(images, 1);

  env.cmd().args(["inspect", "development"]).assert().success();
}

#[test]
fn gc_prunes_entries_for_deleted_images() {
  let env = TestEnv::project();
  env.build("development");
  std::fs::remove_dir_all(env.store_path().join("image")).unwrap();

  env
    .cmd()
    .arg("gc")
    .assert()
    .success()
    .stdout(predicate::str::contains("Layers removed: 1"))
    .stdout(predicate::str::contains("Index entries pruned: 1"));

  env
    .cmd()
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("No images built yet"));
}
