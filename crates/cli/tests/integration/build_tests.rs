//! Build command integration tests.

use predicates::prelude::*;

use super::common::{MANIFEST, TestEnv, local_config};

#[test]
fn build_produces_named_artifact() {
  let env = TestEnv::local();

  env
    .lpk_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Build complete"));

  let artifacts = env.artifacts();
  assert_eq!(artifacts.len(), 1);
  let name = artifacts[0].file_name().unwrap().to_string_lossy().to_string();
  assert!(name.starts_with("demo-1.2.0-"), "unexpected artifact name {name}");
  assert!(!env.app_dir().join("out.lpk").exists());
  assert!(!env.state_path().exists());
}

#[test]
fn build_json_reports_identity() {
  let env = TestEnv::local();

  let report = env.json(&["build", "--output", "json"]);

  assert_eq!(report["app_id"], "cloud.lazycat.demo");
  assert_eq!(report["version"], "1.2.0");
  assert_eq!(report["publish"], "disabled");
  assert_eq!(report["cache_hit"], false);
  let sha = report["sha256"].as_str().unwrap();
  assert_eq!(sha.len(), 64);
  assert_eq!(report["id"], format!("cloud.lazycat.demo-1.2.0-{sha}"));
  assert!(report.get("upload_id").is_none());
}

#[test]
fn second_build_skips_command() {
  let env = TestEnv::local();
  env.json(&["build", "--output", "json"]);

  // A command that would fail proves the cached artifact was used.
  env.write_config(&local_config("exit 7"));
  let report = env.json(&["build", "--output", "json"]);

  assert_eq!(report["cache_hit"], true);
  assert_eq!(env.artifacts().len(), 1);
}

#[test]
fn build_renders_templates_with_cli_variables() {
  let env = TestEnv::local();
  env.write_file("app/config/site.conf.tmpl", "domain={{ .DOMAIN }}\n");

  env
    .lpk_cmd()
    .args(["build", "--var", "DOMAIN=example.com"])
    .assert()
    .success();

  assert_eq!(env.read_file("app/config/site.conf"), "domain=example.com\n");
}

#[test]
fn cli_variable_overrides_description() {
  let env = TestEnv::local();
  env.write_config(&format!(
    "{}\n[env.variables]\nDOMAIN = \"from-file\"\n",
    local_config("printf data > out.lpk")
  ));
  env.write_file("app/site.conf.tmpl", "{{ .DOMAIN }}");

  env.lpk_cmd().arg("build").assert().success();
  assert_eq!(env.read_file("app/site.conf"), "from-file");

  env
    .lpk_cmd()
    .args(["build", "--var", "DOMAIN=from-flag"])
    .assert()
    .success();
  assert_eq!(env.read_file("app/site.conf"), "from-flag");
}

#[test]
fn templated_manifest_drives_identity() {
  let env = TestEnv::empty();
  env.write_config(&local_config("printf data > out.lpk"));
  env.write_file(
    "app/lzc-manifest.yml.tmpl",
    "name: demo\nversion: {{ .VERSION }}\nappid: cloud.lazycat.demo\n",
  );

  let report = env.json(&["build", "--output", "json", "--var", "VERSION=3.0.1"]);

  assert_eq!(report["version"], "3.0.1");
}

#[test]
fn variables_reach_build_command() {
  let env = TestEnv::local();
  env.write_config(&local_config("printf \"$PAYLOAD\" > out.lpk"));

  env
    .lpk_cmd()
    .args(["build", "--var", "PAYLOAD=hello"])
    .assert()
    .success();

  let artifacts = env.artifacts();
  assert_eq!(std::fs::read_to_string(&artifacts[0]).unwrap(), "hello");
}

#[test]
fn missing_variable_is_reported() {
  let env = TestEnv::local();
  env.write_file("app/site.conf.tmpl", "{{ .DOMAIN }}");

  env
    .lpk_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("environment variable DOMAIN not provided"));

  assert!(env.artifacts().is_empty());
}

#[test]
fn failing_command_is_reported() {
  let env = TestEnv::local();
  env.write_config(&local_config("echo boom >&2; exit 3"));

  env
    .lpk_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("exit code 3"))
    .stderr(predicate::str::contains("boom"));
}

#[test]
fn command_without_artifact_is_reported() {
  let env = TestEnv::local();
  env.write_config(&local_config("true"));

  env
    .lpk_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("no .lpk artifact produced"));
}

#[test]
fn missing_manifest_is_reported() {
  let env = TestEnv::empty();
  env.write_config(&local_config("printf data > out.lpk"));
  std::fs::create_dir_all(env.app_dir()).unwrap();

  env
    .lpk_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("lzc-manifest.yml"));
}

#[test]
fn publishing_requires_registry() {
  let env = TestEnv::local();
  env.write_config("[source.local]\npath = \"app\"\n\n[build]\ncommand = 'printf data > out.lpk'\n");

  env
    .lpk_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("no registry configured"));

  // Validation happens before the build runs.
  assert!(env.artifacts().is_empty());
}

#[test]
fn contradictory_source_fails_before_registry_connection() {
  let env = TestEnv::local();
  env.write_config(
    "[source.local]\npath = \"app\"\n\n[source.git]\nurl = \"https://example.com/demo.git\"\n\n[publish]\nenabled = false\n",
  );

  // Nothing listens on the endpoint; reaching it would surface a connection error.
  env
    .lpk_cmd()
    .args(["build", "--endpoint", "http://127.0.0.1:9", "--user", "a"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid source"))
    .stderr(predicate::str::contains("mutually exclusive"))
    .stderr(predicate::str::contains("registry users").not());
}

#[test]
fn conditional_template_blocks() {
  let env = TestEnv::local();
  env.write_file(
    "app/site.conf.tmpl",
    "{{ if eq .MODE \"debug\" }}log=verbose{{ else }}log=quiet{{ end }}\n",
  );

  env.lpk_cmd().args(["build", "--var", "MODE=debug"]).assert().success();
  assert_eq!(env.read_file("app/site.conf"), "log=verbose\n");
}

#[test]
fn no_publish_flag_disables_upload() {
  let env = TestEnv::local();
  env.write_config("[source.local]\npath = \"app\"\n\n[build]\ncommand = 'printf data > out.lpk'\n");

  let report = env.json(&["build", "--no-publish", "--output", "json"]);

  assert_eq!(report["publish"], "disabled");
}

#[test]
fn registry_endpoint_requires_user() {
  let env = TestEnv::local();

  env
    .lpk_cmd()
    .args(["build", "--endpoint", "http://127.0.0.1:9"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("--user"));
}

#[test]
fn manifest_without_version_fails() {
  let env = TestEnv::empty();
  env.write_config(&local_config("printf data > out.lpk"));
  env.write_file("app/lzc-manifest.yml", &MANIFEST.replace("version: 1.2.0\n", ""));

  env
    .lpk_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("version"));
}
