//! Persisted pipeline state.
//!
//! The resource adapter keeps the last [`PipelineResult`] in a JSON file so
//! the next run can reuse its upload:
//!
//! ```json
//! { "version": 1, "resource": { "id": "...", "artifact_path": "...", ... } }
//! ```
//!
//! `resource` is `null` once the resource has been destroyed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::STATE_FILENAME;
use crate::pipeline::PipelineResult;

/// Current state file format version.
pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StateError {
  #[error("failed to read state file {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse state file {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("unsupported state file version {version} in {} (expected {})", path.display(), STATE_VERSION)]
  UnsupportedVersion { path: PathBuf, version: u32 },

  #[error("failed to serialize state: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to write state file {}: {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StateDocument {
  version: u32,
  resource: Option<PipelineResult>,
}

#[derive(Debug, Clone)]
pub struct StateFile {
  path: PathBuf,
}

impl StateFile {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// The default state file stored beside a build description.
  pub fn beside(config_path: &Path) -> Self {
    let dir = config_path.parent().unwrap_or_else(|| Path::new(""));
    Self::new(dir.join(STATE_FILENAME))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Load the persisted result. Returns `None` if there is no state file or
  /// the resource has been destroyed.
  pub fn load(&self) -> Result<Option<PipelineResult>, StateError> {
    let content = match fs::read_to_string(&self.path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => {
        return Err(StateError::Read {
          path: self.path.clone(),
          source,
        });
      }
    };

    let document: StateDocument = serde_json::from_str(&content).map_err(|source| StateError::Parse {
      path: self.path.clone(),
      source,
    })?;

    if document.version != STATE_VERSION {
      return Err(StateError::UnsupportedVersion {
        path: self.path.clone(),
        version: document.version,
      });
    }

    Ok(document.resource)
  }

  pub fn save(&self, result: &PipelineResult) -> Result<(), StateError> {
    self.write(Some(result.clone()))
  }

  /// Mark the resource as destroyed.
  pub fn clear(&self) -> Result<(), StateError> {
    self.write(None)
  }

  /// Atomic write: temp file in the same directory, then rename.
  fn write(&self, resource: Option<PipelineResult>) -> Result<(), StateError> {
    let document = StateDocument {
      version: STATE_VERSION,
      resource,
    };
    let content = serde_json::to_string_pretty(&document).map_err(StateError::Serialize)?;

    let write_err = |source: io::Error| StateError::Write {
      path: self.path.clone(),
      source,
    };
    if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
      fs::create_dir_all(dir).map_err(write_err)?;
    }

    let mut temp_name = self.path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = self.path.with_file_name(temp_name);

    fs::write(&temp_path, format!("{content}\n")).map_err(write_err)?;
    fs::rename(&temp_path, &self.path).map_err(write_err)?;

    debug!(path = %self.path.display(), "saved state");
    Ok(())
  }
}
