//! Destroy command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn destroy_without_state_is_noop() {
  let env = TestEnv::local();

  env
    .lpk_cmd()
    .arg("destroy")
    .assert()
    .success()
    .stdout(predicate::str::contains("Nothing to destroy"));
}

#[test]
fn destroy_removes_artifact_and_clears_state() {
  let env = TestEnv::local();
  env.lpk_cmd().arg("apply").assert().success();
  assert_eq!(env.artifacts().len(), 1);

  env
    .lpk_cmd()
    .arg("destroy")
    .assert()
    .success()
    .stdout(predicate::str::contains("Destroy complete"));

  assert!(env.artifacts().is_empty());
  let state: serde_json::Value = serde_json::from_str(&env.read_file("lpkbuild.state.json")).unwrap();
  assert!(state["resource"].is_null());
}

#[test]
fn destroy_tolerates_missing_artifact() {
  let env = TestEnv::local();
  env.lpk_cmd().arg("apply").assert().success();
  for artifact in env.artifacts() {
    std::fs::remove_file(artifact).unwrap();
  }

  env.lpk_cmd().arg("destroy").assert().success();
}

#[test]
fn destroy_twice_is_noop() {
  let env = TestEnv::local();
  env.lpk_cmd().arg("apply").assert().success();
  env.lpk_cmd().arg("destroy").assert().success();

  env
    .lpk_cmd()
    .arg("destroy")
    .assert()
    .success()
    .stdout(predicate::str::contains("Nothing to destroy"));
}

#[test]
fn destroy_json_reports_destroyed_result() {
  let env = TestEnv::local();
  let applied = env.json(&["apply", "--output", "json"]);

  let report = env.json(&["destroy", "--output", "json"]);

  assert_eq!(report["destroyed"]["id"], applied["id"]);
}

#[test]
fn destroy_upload_without_registry_fails() {
  let env = TestEnv::local();
  env.write_file(
    "lpkbuild.state.json",
    r#"{
  "version": 1,
  "resource": {
    "id": "cloud.lazycat.demo-1.2.0-abc",
    "artifact_path": "/nonexistent/demo.lpk",
    "app_id": "cloud.lazycat.demo",
    "version": "1.2.0",
    "sha256": "abc",
    "download_url": "https://registry.test/lpks/u1",
    "upload_id": "u1"
  }
}
"#,
  );

  env
    .lpk_cmd()
    .arg("destroy")
    .assert()
    .failure()
    .stderr(predicate::str::contains("no registry configured"));

  // State is kept so the teardown can be retried.
  assert!(env.read_file("lpkbuild.state.json").contains("\"u1\""));
}
