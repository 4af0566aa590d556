mod apply;
mod build;
mod destroy;
mod status;

pub use apply::cmd_apply;
pub use build::cmd_build;
pub use destroy::cmd_destroy;
pub use status::cmd_status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use clap::Args;
use serde::Serialize;
use tracing::debug;

use lpkbuild_lib::config::{BuildSpec, PublishConfig, VariableValue};
use lpkbuild_lib::exec::SystemRunner;
use lpkbuild_lib::pipeline::{ApplyOutcome, Pipeline, PipelineResult, PublishStatus};
use lpkbuild_lib::registry::{HttpRegistryClient, RegistryClient, contains_uid};
use lpkbuild_lib::source::SourceDescriptor;
use lpkbuild_lib::state::StateFile;

use crate::output::{OutputFormat, print_json, print_stat};

/// Adjustments applied to the build description after it is loaded.
#[derive(Args, Debug, Default)]
pub struct Overrides {
  /// Build locally without publishing, whatever the description says
  #[arg(long, global = true)]
  pub no_publish: bool,

  /// Set a template/build variable (repeatable)
  #[arg(long = "var", value_name = "KEY=VALUE", global = true, value_parser = parse_var)]
  pub vars: Vec<(String, String)>,
}

#[derive(Args, Debug, Default)]
pub struct RegistryArgs {
  /// Registry base URL
  #[arg(long, env = "LPK_ENDPOINT", global = true)]
  pub endpoint: Option<String>,

  /// Registry user id; uploads are made on its behalf
  #[arg(long, env = "LPK_USER", global = true)]
  pub user: Option<String>,

  /// Registry password
  #[arg(long, env = "LPK_PASSWORD", global = true, hide_env_values = true)]
  pub password: Option<String>,
}

pub struct Context {
  pub output: OutputFormat,
  pub overrides: Overrides,
  pub registry: RegistryArgs,
}

impl Context {
  /// Load the build description and apply the command-line overrides.
  ///
  /// The source block is validated here so a contradictory description fails
  /// before any registry connection is attempted.
  pub fn load_spec(&self, config: &Path) -> Result<BuildSpec> {
    let mut spec =
      BuildSpec::load(config).with_context(|| format!("Failed to load build description {}", config.display()))?;
    SourceDescriptor::from_config(&spec.source)
      .with_context(|| format!("Invalid build description {}", config.display()))?;

    if !self.overrides.vars.is_empty() {
      let env = spec.env.get_or_insert_with(Default::default);
      for (key, value) in &self.overrides.vars {
        env.variables.insert(key.clone(), VariableValue::Literal(value.clone()));
      }
    }

    if self.overrides.no_publish {
      spec.publish.get_or_insert_with(PublishConfig::default).enabled = Some(false);
    }

    Ok(spec)
  }

  /// A pipeline backed by real processes, with a registry attached when an
  /// endpoint is configured.
  pub async fn pipeline(&self) -> Result<Pipeline> {
    let pipeline = Pipeline::new(Arc::new(SystemRunner));
    match self.connect().await? {
      Some((client, user)) => Ok(pipeline.with_registry(client, user)),
      None => Ok(pipeline),
    }
  }

  async fn connect(&self) -> Result<Option<(Arc<dyn RegistryClient>, String)>> {
    let Some(endpoint) = self.registry.endpoint.as_deref().filter(|e| !e.is_empty()) else {
      return Ok(None);
    };
    let Some(user) = self.registry.user.as_deref().filter(|u| !u.is_empty()) else {
      bail!("--user (or LPK_USER) is required when a registry endpoint is set");
    };
    let password = self.registry.password.as_deref().unwrap_or_default();

    let client = HttpRegistryClient::new(endpoint, user, password).context("Invalid registry endpoint")?;
    let users = client
      .list_users()
      .await
      .with_context(|| format!("Failed to list registry users at {endpoint}"))?;
    if !contains_uid(&users, user) {
      bail!("user '{user}' is not registered at {endpoint}");
    }
    debug!(endpoint, user, users = users.len(), "registry connected");

    Ok(Some((Arc::new(client), user.to_string())))
  }

  pub fn state_file(&self, config: &Path, state: Option<PathBuf>) -> StateFile {
    match state {
      Some(path) => StateFile::new(path),
      None => StateFile::beside(config),
    }
  }
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
  let (key, value) = raw
    .split_once('=')
    .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
  let key = key.trim();
  if key.is_empty() {
    return Err(format!("empty variable name in '{raw}'"));
  }
  Ok((key.to_string(), value.to_string()))
}

/// JSON shape printed by `build` and `apply`.
#[derive(Serialize)]
struct ResultReport<'a> {
  #[serde(flatten)]
  result: &'a PipelineResult,
  publish: PublishStatus,
  cache_hit: bool,
}

fn print_result_stats(result: &PipelineResult) {
  print_stat("ID", &result.id);
  print_stat("Artifact", &result.artifact_path.display().to_string());
  print_stat("App ID", &result.app_id);
  print_stat("Version", &result.version);
  print_stat("SHA-256", &result.sha256);
  if let Some(url) = &result.download_url {
    print_stat("Download URL", url);
  }
  if let Some(id) = &result.upload_id {
    print_stat("Upload ID", id);
  }
}

fn print_outcome(output: OutputFormat, outcome: &ApplyOutcome) -> Result<()> {
  if output.is_json() {
    return print_json(&ResultReport {
      result: &outcome.result,
      publish: outcome.publish,
      cache_hit: outcome.cache_hit,
    });
  }
  print_result_stats(&outcome.result);
  Ok(())
}
