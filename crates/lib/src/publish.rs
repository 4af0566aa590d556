//! Publish decisions and upload delegation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::artifact::ArtifactMetadata;
use crate::config::PublishConfig;
use crate::registry::{RegistryClient, RegistryError};

#[derive(Debug, Error)]
pub enum PublishError {
  #[error("upload of {} failed: {source}", path.display())]
  Upload {
    path: PathBuf,
    #[source]
    source: RegistryError,
  },
}

/// What the registry knows about a previous upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
  pub upload_id: String,
  pub download_url: String,
  pub sha256: String,
  pub version: String,
}

/// Publishing is on unless explicitly disabled.
pub fn should_publish(config: Option<&PublishConfig>) -> bool {
  config.and_then(|c| c.enabled).unwrap_or(true)
}

/// Whether `prior` already holds the exact bytes described by `current`.
pub fn can_reuse(prior: Option<&UploadRecord>, current: &ArtifactMetadata) -> bool {
  let Some(prior) = prior else {
    return false;
  };
  let reusable = !prior.upload_id.is_empty() && !prior.download_url.is_empty() && prior.sha256 == current.sha256;
  debug!(upload_id = %prior.upload_id, reusable, "checked prior upload");
  reusable
}

/// Upload an artifact. The returned record keeps the local `sha256` and
/// `version` unless the registry reports its own.
pub async fn publish(
  client: &dyn RegistryClient,
  user: &str,
  name: &str,
  version: &str,
  sha256: &str,
  path: &Path,
) -> Result<UploadRecord, PublishError> {
  let response = client
    .upload(user, name, version, path)
    .await
    .map_err(|source| PublishError::Upload {
      path: path.to_path_buf(),
      source,
    })?;

  info!(upload_id = %response.id, url = %response.download_url, "artifact uploaded");

  Ok(UploadRecord {
    upload_id: response.id,
    download_url: response.download_url,
    sha256: non_empty_or(response.sha256, sha256),
    version: non_empty_or(response.version, version),
  })
}

fn non_empty_or(value: String, fallback: &str) -> String {
  if value.is_empty() { fallback.to_string() } else { value }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::registry::UploadResponse;
  use crate::util::testutil::FakeRegistry;

  fn meta(sha: &str) -> ArtifactMetadata {
    ArtifactMetadata {
      app_id: "a1".to_string(),
      version: "1.0.0".to_string(),
      sha256: sha.to_string(),
      name: "app".to_string(),
    }
  }

  fn record(id: &str, url: &str, sha: &str) -> UploadRecord {
    UploadRecord {
      upload_id: id.to_string(),
      download_url: url.to_string(),
      sha256: sha.to_string(),
      version: "1.0.0".to_string(),
    }
  }

  mod decisions {
    use super::*;

    #[test]
    fn publishes_unless_disabled() {
      assert!(should_publish(None));
      assert!(should_publish(Some(&PublishConfig::default())));
      let enabled = PublishConfig {
        enabled: Some(true),
        ..Default::default()
      };
      assert!(should_publish(Some(&enabled)));
      let disabled = PublishConfig {
        enabled: Some(false),
        ..Default::default()
      };
      assert!(!should_publish(Some(&disabled)));
    }

    #[test]
    fn reuse_requires_complete_matching_record() {
      let current = meta("H");
      assert!(can_reuse(Some(&record("id", "https://x/id", "H")), &current));

      assert!(!can_reuse(None, &current));
      assert!(!can_reuse(Some(&record("", "https://x/id", "H")), &current));
      assert!(!can_reuse(Some(&record("id", "", "H")), &current));
      assert!(!can_reuse(Some(&record("id", "https://x/id", "H2")), &current));
    }
  }

  mod uploading {
    use super::*;

    #[tokio::test]
    async fn keeps_local_values_when_registry_reports_none() {
      let registry = FakeRegistry::new();

      let rec = publish(&registry, "alice", "app", "1.0.0", "H", Path::new("/tmp/app.lpk"))
        .await
        .unwrap();

      assert_eq!(rec.upload_id, "upload-1");
      assert_eq!(rec.sha256, "H");
      assert_eq!(rec.version, "1.0.0");
      let uploads = registry.uploads();
      assert_eq!(uploads.len(), 1);
      assert_eq!(uploads[0].user, "alice");
      assert_eq!(uploads[0].name, "app");
    }

    #[tokio::test]
    async fn registry_values_take_precedence() {
      let registry = FakeRegistry::new().with_response(UploadResponse {
        id: "r1".to_string(),
        download_url: "https://registry/r1".to_string(),
        sha256: "REMOTE".to_string(),
        version: "1.0.0+build".to_string(),
      });

      let rec = publish(&registry, "alice", "app", "1.0.0", "H", Path::new("/tmp/app.lpk"))
        .await
        .unwrap();

      assert_eq!(
        rec,
        UploadRecord {
          version: "1.0.0+build".to_string(),
          ..record("r1", "https://registry/r1", "REMOTE")
        }
      );
    }

    #[tokio::test]
    async fn failure_is_upload_error() {
      let registry = FakeRegistry::new().failing_uploads("quota exceeded");

      let err = publish(&registry, "alice", "app", "1.0.0", "H", Path::new("/tmp/app.lpk"))
        .await
        .unwrap_err();
      assert!(err.to_string().contains("quota exceeded"));
    }
  }
}
