//! The build pipeline: source, templates, artifact, publish.
//!
//! [`Pipeline::apply`] runs every stage in order and stops at the first
//! failure. The ephemeral clone of a git source is removed on every exit
//! path, including cancellation (dropping the future). [`Pipeline::teardown`]
//! undoes a previous result.

mod error;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::artifact::{self, BuiltArtifact};
use crate::config::{BuildSpec, EnvConfig, Variables};
use crate::exec::CommandRunner;
use crate::publish::{self, UploadRecord, can_reuse, should_publish};
use crate::registry::RegistryClient;
use crate::source::{self, SourceDescriptor};
use crate::template;

pub use error::{ErrorKind, PipelineError};

/// Everything a caller needs to persist about one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
  /// `{app_id}-{version}-{sha256}` of the built artifact.
  pub id: String,
  pub artifact_path: PathBuf,
  pub app_id: String,
  pub version: String,
  pub sha256: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub download_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub upload_id: Option<String>,
}

impl PipelineResult {
  /// The upload this result refers to, if any.
  pub fn upload_record(&self) -> Option<UploadRecord> {
    let upload_id = self.upload_id.clone().filter(|id| !id.is_empty())?;
    Some(UploadRecord {
      upload_id,
      download_url: self.download_url.clone().unwrap_or_default(),
      sha256: self.sha256.clone(),
      version: self.version.clone(),
    })
  }
}

/// How the publish stage concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
  Disabled,
  Uploaded,
  Reused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
  pub result: PipelineResult,
  pub publish: PublishStatus,
  /// Whether the build command was skipped.
  pub cache_hit: bool,
}

pub struct Pipeline {
  runner: Arc<dyn CommandRunner>,
  registry: Option<Arc<dyn RegistryClient>>,
  user: String,
}

impl Pipeline {
  pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
    Self {
      runner,
      registry: None,
      user: String::new(),
    }
  }

  /// Attach a registry; uploads are made on behalf of `user`.
  pub fn with_registry(mut self, registry: Arc<dyn RegistryClient>, user: impl Into<String>) -> Self {
    self.registry = Some(registry);
    self.user = user.into();
    self
  }

  /// Build (and possibly publish) the artifact described by `spec`.
  ///
  /// `prior` is the result of the previous run for the same resource; its
  /// upload is reused when the artifact bytes are unchanged.
  pub async fn apply(&self, spec: &BuildSpec, prior: Option<&PipelineResult>) -> Result<ApplyOutcome, PipelineError> {
    // Validation first: no filesystem or network access before this point.
    let descriptor = SourceDescriptor::from_config(&spec.source)?;
    let registry = if should_publish(spec.publish.as_ref()) {
      Some(self.registry.as_deref().ok_or(PipelineError::NoRegistry)?)
    } else {
      None
    };

    let variables = EnvConfig::collect_variables(spec.env.as_ref());
    let extension = EnvConfig::template_extension(spec.env.as_ref());

    let resolved = source::resolve(&descriptor, self.runner.as_ref()).await?;
    let outcome = self
      .run_stages(resolved.workdir(), spec, &variables, &extension, registry, prior)
      .await;
    resolved.cleanup();
    outcome
  }

  async fn run_stages(
    &self,
    workdir: &Path,
    spec: &BuildSpec,
    variables: &Variables,
    extension: &str,
    registry: Option<&dyn RegistryClient>,
    prior: Option<&PipelineResult>,
  ) -> Result<ApplyOutcome, PipelineError> {
    template::render_tree(workdir, extension, variables)?;

    let BuiltArtifact {
      path,
      metadata,
      cache_hit,
    } = artifact::build(
      self.runner.as_ref(),
      workdir,
      spec.build.as_ref(),
      spec.publish.as_ref(),
      variables,
    )
    .await?;

    let mut result = PipelineResult {
      id: format!("{}-{}-{}", metadata.app_id, metadata.version, metadata.sha256),
      artifact_path: path,
      app_id: metadata.app_id.clone(),
      version: metadata.version.clone(),
      sha256: metadata.sha256.clone(),
      download_url: None,
      upload_id: None,
    };

    let Some(registry) = registry else {
      info!(id = %result.id, "publishing disabled");
      return Ok(ApplyOutcome {
        result,
        publish: PublishStatus::Disabled,
        cache_hit,
      });
    };

    let prior_upload = prior.and_then(PipelineResult::upload_record);
    let status = if can_reuse(prior_upload.as_ref(), &metadata) {
      let record = prior_upload.unwrap_or_default();
      info!(upload_id = %record.upload_id, "artifact unchanged, reusing upload");
      result.download_url = Some(record.download_url);
      result.upload_id = Some(record.upload_id);
      if !record.version.is_empty() {
        result.version = record.version;
      }
      PublishStatus::Reused
    } else {
      let record = publish::publish(
        registry,
        &self.user,
        &metadata.name,
        &metadata.version,
        &metadata.sha256,
        &result.artifact_path,
      )
      .await?;
      result.download_url = Some(record.download_url);
      result.upload_id = Some(record.upload_id);
      result.sha256 = record.sha256;
      result.version = record.version;
      PublishStatus::Uploaded
    };

    Ok(ApplyOutcome {
      result,
      publish: status,
      cache_hit,
    })
  }

  /// Delete the remote upload and the local artifact of `prior`.
  ///
  /// Both deletions are attempted; missing targets are not errors. When both
  /// fail, the remote failure is returned.
  pub async fn teardown(&self, prior: &PipelineResult) -> Result<(), PipelineError> {
    let upload_id = prior.upload_id.as_deref().filter(|id| !id.is_empty());
    let remote = match (upload_id, self.registry.as_deref()) {
      (Some(upload_id), Some(registry)) => delete_upload(registry, upload_id).await,
      (Some(_), None) => Err(PipelineError::NoRegistry),
      (None, _) => Ok(()),
    };
    let local = remove_artifact(&prior.artifact_path).await;

    if let Err(e) = &local {
      warn!(error = %e, "local artifact removal failed");
    }
    remote?;
    local
  }
}

async fn delete_upload(registry: &dyn RegistryClient, upload_id: &str) -> Result<(), PipelineError> {
  match registry.delete(upload_id).await {
    Ok(()) => {
      info!(upload_id, "deleted upload");
      Ok(())
    }
    Err(e) if e.is_not_found() => {
      info!(upload_id, "upload already gone");
      Ok(())
    }
    Err(source) => {
      warn!(upload_id, error = %source, "upload deletion failed");
      Err(PipelineError::Delete {
        upload_id: upload_id.to_string(),
        source,
      })
    }
  }
}

async fn remove_artifact(path: &Path) -> Result<(), PipelineError> {
  if path.as_os_str().is_empty() {
    return Ok(());
  }
  match tokio::fs::remove_file(path).await {
    Ok(()) => {
      info!(path = %path.display(), "removed artifact");
      Ok(())
    }
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(source) => Err(PipelineError::RemoveArtifact {
      path: path.to_path_buf(),
      source,
    }),
  }
}
