//! Apply command integration tests.

use predicates::prelude::*;

use super::common::{TestEnv, local_config};

#[test]
fn apply_records_state() {
  let env = TestEnv::local();

  env
    .lpk_cmd()
    .arg("apply")
    .assert()
    .success()
    .stdout(predicate::str::contains("Apply complete"))
    .stdout(predicate::str::contains("Publishing disabled"));

  let state: serde_json::Value = serde_json::from_str(&env.read_file("lpkbuild.state.json")).unwrap();
  assert_eq!(state["version"], 1);
  assert_eq!(state["resource"]["app_id"], "cloud.lazycat.demo");
  assert_eq!(env.artifacts().len(), 1);
}

#[test]
fn apply_is_idempotent() {
  let env = TestEnv::local();
  let first = env.json(&["apply", "--output", "json"]);

  env.write_config(&local_config("exit 9"));
  let second = env.json(&["apply", "--output", "json"]);

  assert_eq!(second["cache_hit"], true);
  assert_eq!(second["id"], first["id"]);
  assert_eq!(second["artifact_path"], first["artifact_path"]);
}

#[test]
fn apply_after_manifest_change_builds_new_artifact() {
  let env = TestEnv::local();
  let first = env.json(&["apply", "--output", "json"]);

  env.write_file("app/lzc-manifest.yml", "name: demo\nversion: 1.3.0\nappid: cloud.lazycat.demo\n");
  let second = env.json(&["apply", "--output", "json"]);

  assert_eq!(second["cache_hit"], false);
  assert_eq!(second["version"], "1.3.0");
  assert_ne!(second["artifact_path"], first["artifact_path"]);
}

#[test]
fn apply_with_explicit_state_path() {
  let env = TestEnv::local();
  let state = env.temp.path().join("state/custom.json");

  env
    .lpk_cmd()
    .arg("apply")
    .arg("--state")
    .arg(&state)
    .assert()
    .success();

  assert!(state.exists());
  assert!(!env.state_path().exists());
}

#[test]
fn apply_with_explicit_config_path() {
  let env = TestEnv::local();
  let elsewhere = tempfile::TempDir::new().unwrap();

  // The relative source path resolves against the description file, not the
  // working directory.
  env
    .lpk_cmd()
    .current_dir(elsewhere.path())
    .arg("apply")
    .arg(&env.config_path)
    .assert()
    .success();

  assert!(env.state_path().exists());
  assert_eq!(env.artifacts().len(), 1);
}

#[test]
fn failed_apply_keeps_previous_state() {
  let env = TestEnv::local();
  env.lpk_cmd().arg("apply").assert().success();
  let before = env.read_file("lpkbuild.state.json");

  env.write_file("app/lzc-manifest.yml", "name: demo\nversion: 2.0.0\nappid: cloud.lazycat.demo\n");
  env.write_config(&local_config("exit 1"));
  env.lpk_cmd().arg("apply").assert().failure();

  assert_eq!(env.read_file("lpkbuild.state.json"), before);
}

#[test]
fn apply_with_invalid_description_fails() {
  let env = TestEnv::local();
  env.write_config("[source.local]\npath = \"app\"\n\n[mystery]\nkey = 1\n");

  env
    .lpk_cmd()
    .arg("apply")
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to load build description"));
}
