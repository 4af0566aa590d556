//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

pub const MANIFEST: &str = "name: demo\nversion: 1.2.0\nappid: cloud.lazycat.demo\n";

/// A build description for the `app/` directory that publishes nothing.
pub fn local_config(command: &str) -> String {
  format!(
    r#"[source.local]
path = "app"

[build]
command = '{command}'

[publish]
enabled = false
"#
  )
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the build description
/// (`lpkbuild.toml`) and the source tree (`app/`).
pub struct TestEnv {
  pub temp: TempDir,
  pub config_path: PathBuf,
}

impl TestEnv {
  /// A source tree with a manifest and a build command that writes `out.lpk`.
  pub fn local() -> Self {
    let env = Self::empty();
    env.write_file("app/lzc-manifest.yml", MANIFEST);
    env.write_config(&local_config("printf data > out.lpk"));
    env
  }

  pub fn empty() -> Self {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("lpkbuild.toml");
    Self { temp, config_path }
  }

  pub fn write_config(&self, content: &str) {
    std::fs::write(&self.config_path, content).unwrap();
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn read_file(&self, relative_path: &str) -> String {
    std::fs::read_to_string(self.temp.path().join(relative_path)).unwrap()
  }

  pub fn app_dir(&self) -> PathBuf {
    self.temp.path().join("app")
  }

  pub fn state_path(&self) -> PathBuf {
    self.temp.path().join("lpkbuild.state.json")
  }

  /// Every `.lpk` file currently in the source tree.
  pub fn artifacts(&self) -> Vec<PathBuf> {
    lpk_files(&self.app_dir())
  }

  /// Get a pre-configured Command for the lpk binary.
  ///
  /// Registry settings are removed from the inherited environment so no test
  /// reaches the network by accident.
  pub fn lpk_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("lpk");
    cmd.current_dir(self.temp.path());
    cmd.env_remove("LPK_ENDPOINT");
    cmd.env_remove("LPK_USER");
    cmd.env_remove("LPK_PASSWORD");
    cmd.env_remove("RUST_LOG");
    cmd
  }

  /// Parse the JSON printed on stdout by a successful command.
  pub fn json(&self, args: &[&str]) -> serde_json::Value {
    let output = self.lpk_cmd().args(args).output().unwrap();
    assert!(
      output.status.success(),
      "lpk {args:?} failed: {}",
      String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
  }
}

fn lpk_files(dir: &Path) -> Vec<PathBuf> {
  let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
    .unwrap()
    .flatten()
    .map(|e| e.path())
    .filter(|p| p.extension().is_some_and(|ext| ext == "lpk"))
    .collect();
  files.sort();
  files
}
