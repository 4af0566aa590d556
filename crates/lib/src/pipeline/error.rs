use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::artifact::BuildError;
use crate::publish::PublishError;
use crate::registry::RegistryError;
use crate::source::SourceError;
use crate::template::TemplateError;

/// Coarse classification of a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  Config,
  SourceAcquisition,
  Manifest,
  Template,
  BuildCommand,
  NoArtifactProduced,
  Upload,
  Delete,
  Io,
}

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Source(#[from] SourceError),

  #[error(transparent)]
  Template(#[from] TemplateError),

  #[error(transparent)]
  Build(#[from] BuildError),

  #[error(transparent)]
  Publish(#[from] PublishError),

  #[error("no registry configured; pass --endpoint/--user/--password or disable publishing")]
  NoRegistry,

  #[error("failed to delete upload {upload_id}: {source}")]
  Delete {
    upload_id: String,
    #[source]
    source: RegistryError,
  },

  #[error("failed to remove artifact {}: {source}", path.display())]
  RemoveArtifact {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

impl PipelineError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      PipelineError::Source(e) if e.is_config() => ErrorKind::Config,
      PipelineError::Source(_) => ErrorKind::SourceAcquisition,
      PipelineError::Template(_) => ErrorKind::Template,
      PipelineError::Build(BuildError::Manifest(_)) => ErrorKind::Manifest,
      PipelineError::Build(BuildError::Command(_)) => ErrorKind::BuildCommand,
      PipelineError::Build(BuildError::NoArtifactProduced { .. }) => ErrorKind::NoArtifactProduced,
      PipelineError::Build(_) => ErrorKind::Io,
      PipelineError::Publish(_) => ErrorKind::Upload,
      PipelineError::NoRegistry => ErrorKind::Config,
      PipelineError::Delete { .. } => ErrorKind::Delete,
      PipelineError::RemoveArtifact { .. } => ErrorKind::Io,
    }
  }

  /// The undefined template variable, for missing-key failures.
  pub fn missing_key(&self) -> Option<&str> {
    match self {
      PipelineError::Template(e) => e.key(),
      _ => None,
    }
  }
}
