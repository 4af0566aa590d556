//! Status command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn status_without_state() {
  let env = TestEnv::local();

  env
    .lpk_cmd()
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("No recorded build"));
}

#[test]
fn status_shows_recorded_build() {
  let env = TestEnv::local();
  env.lpk_cmd().arg("apply").assert().success();

  env
    .lpk_cmd()
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("Recorded build: cloud.lazycat.demo-1.2.0-"));
}

#[test]
fn status_json_matches_apply() {
  let env = TestEnv::local();
  let applied = env.json(&["apply", "--output", "json"]);

  let status = env.json(&["status", "--output", "json"]);

  assert_eq!(status["resource"]["id"], applied["id"]);
  assert_eq!(status["resource"]["sha256"], applied["sha256"]);
}

#[test]
fn status_rejects_corrupt_state() {
  let env = TestEnv::local();
  env.write_file("lpkbuild.state.json", "{ not json");

  env
    .lpk_cmd()
    .arg("status")
    .assert()
    .failure()
    .stderr(predicate::str::contains("failed to parse state file"));
}
