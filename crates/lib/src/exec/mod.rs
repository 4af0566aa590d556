//! External process execution.
//!
//! Every process the pipeline spawns (git, the build command) goes through a
//! [`CommandRunner`], so the pipeline can be exercised with a recording fake
//! instead of real processes.

mod system;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

pub use system::{SystemRunner, get_shell};

/// Errors produced while running an external command.
#[derive(Debug, Error)]
pub enum CommandError {
  /// The process could not be started at all.
  #[error("failed to spawn '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  /// The process ran and exited unsuccessfully.
  #[error("command failed with exit code {}: {command}{}", format_code(.code), format_stderr(.stderr))]
  Failed {
    command: String,
    code: Option<i32>,
    stderr: String,
  },
}

fn format_code(code: &Option<i32>) -> String {
  code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string())
}

fn format_stderr(stderr: &str) -> String {
  let trimmed = stderr.trim();
  if trimmed.is_empty() {
    String::new()
  } else {
    format!("\n{trimmed}")
  }
}

/// A single process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub program: String,
  pub args: Vec<String>,
  pub cwd: PathBuf,
  /// Full replacement environment. `None` inherits the parent environment.
  pub env: Option<BTreeMap<OsString, OsString>>,
  /// Log output lines at info level rather than debug.
  pub echo: bool,
}

impl Invocation {
  pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: cwd.into(),
      env: None,
      echo: false,
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn with_env(mut self, env: Option<BTreeMap<OsString, OsString>>) -> Self {
    self.env = env;
    self
  }

  pub fn echo(mut self) -> Self {
    self.echo = true;
    self
  }

  /// Shell-like rendering used in logs and error messages.
  pub fn display(&self) -> String {
    let mut parts = Vec::with_capacity(self.args.len() + 1);
    parts.push(self.program.clone());
    parts.extend(self.args.iter().cloned());
    parts.join(" ")
  }

  /// `KEY=VALUE` pairs sorted by key, or empty when inheriting. Non-UTF-8
  /// bytes are shown lossily.
  pub fn env_pairs(&self) -> Vec<String> {
    self
      .env
      .as_ref()
      .map(|env| {
        env
          .iter()
          .map(|(k, v)| format!("{}={}", k.to_string_lossy(), v.to_string_lossy()))
          .collect()
      })
      .unwrap_or_default()
  }
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
  pub stdout: String,
  pub stderr: String,
}

/// Runs external processes.
///
/// Implementations must treat a non-zero exit status as
/// [`CommandError::Failed`], carrying the captured stderr.
#[async_trait]
pub trait CommandRunner: Send + Sync {
  async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError>;
}

/// Build the environment for a build command.
///
/// Returns `None` when no variables were supplied, meaning the child simply
/// inherits the parent environment. Otherwise the inherited environment is
/// overlaid with `custom`; supplied values win on collision. Inherited
/// entries are passed through byte for byte, whether or not they are UTF-8.
pub fn command_environment(custom: &BTreeMap<String, String>) -> Option<BTreeMap<OsString, OsString>> {
  if custom.is_empty() {
    return None;
  }

  let mut values: BTreeMap<OsString, OsString> = std::env::vars_os().filter(|(k, _)| !k.is_empty()).collect();

  for (key, value) in custom {
    values.insert(key.into(), value.into());
  }

  Some(values)
}
