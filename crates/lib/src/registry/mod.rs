//! Remote artifact registry.
//!
//! The pipeline talks to the registry only through [`RegistryClient`];
//! [`HttpRegistryClient`] is the concrete HTTP implementation.

mod http;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpRegistryClient;

/// Errors returned by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
  /// The addressed resource does not exist. Callers decide whether this is fatal.
  #[error("resource not found")]
  NotFound,

  #[error("invalid registry endpoint '{endpoint}': {message}")]
  InvalidEndpoint { endpoint: String, message: String },

  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),

  /// The registry answered with an error status.
  #[error("api {method} {path}: {message}")]
  Api {
    method: String,
    path: String,
    message: String,
  },

  #[error("failed to read artifact {path}: {source}")]
  ReadArtifact {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("unexpected {what} payload: {body}")]
  UnexpectedPayload { what: &'static str, body: String },
}

impl RegistryError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, RegistryError::NotFound)
  }
}

/// Registry answer to an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
  pub id: String,
  #[serde(default)]
  pub download_url: String,
  #[serde(default)]
  pub sha256: String,
  #[serde(default)]
  pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryUser {
  pub uid: String,
  #[serde(default)]
  pub nickname: String,
}

#[async_trait]
pub trait RegistryClient: Send + Sync {
  /// Upload an artifact file on behalf of `user`.
  async fn upload(&self, user: &str, name: &str, version: &str, path: &Path) -> Result<UploadResponse, RegistryError>;

  /// Delete a previous upload. Returns [`RegistryError::NotFound`] if it is already gone.
  async fn delete(&self, upload_id: &str) -> Result<(), RegistryError>;

  async fn list_users(&self) -> Result<Vec<RegistryUser>, RegistryError>;
}

/// Whether `uid` is among the registry's users.
pub fn contains_uid(users: &[RegistryUser], uid: &str) -> bool {
  users.iter().any(|u| u.uid == uid)
}
