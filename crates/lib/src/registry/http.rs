//! HTTP implementation of [`RegistryClient`].
//!
//! Endpoints, relative to the configured base URL:
//! - `POST /v1/lpks` (multipart: `uid`, `name`, `version`, `file`)
//! - `DELETE /v1/lpks/{id}`
//! - `GET /v1/users`
//!
//! Every request carries HTTP basic auth. A 404 maps to
//! [`RegistryError::NotFound`]; any other status >= 300 maps to
//! [`RegistryError::Api`] with the trimmed response body.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use tracing::{debug, info};

use super::{RegistryClient, RegistryError, RegistryUser, UploadResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
  base_url: Url,
  http: reqwest::Client,
  username: String,
  password: String,
}

impl HttpRegistryClient {
  pub fn new(endpoint: &str, username: &str, password: &str) -> Result<Self, RegistryError> {
    if endpoint.is_empty() {
      return Err(RegistryError::InvalidEndpoint {
        endpoint: String::new(),
        message: "endpoint is required".to_string(),
      });
    }

    let base_url = Url::parse(endpoint).map_err(|e| RegistryError::InvalidEndpoint {
      endpoint: endpoint.to_string(),
      message: e.to_string(),
    })?;
    if base_url.cannot_be_a_base() {
      return Err(RegistryError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        message: "not a base URL".to_string(),
      });
    }

    let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

    Ok(Self {
      base_url,
      http,
      username: username.to_string(),
      password: password.to_string(),
    })
  }

  fn url(&self, segments: &[&str]) -> Url {
    let mut url = self.base_url.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    url
  }

  async fn send(&self, method: Method, segments: &[&str], request: RequestBuilder) -> Result<Vec<u8>, RegistryError> {
    let path = format!("/{}", segments.join("/"));
    debug!(method = %method, path = %path, "registry request");

    let response = request
      .basic_auth(&self.username, Some(&self.password))
      .send()
      .await?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
      return Err(RegistryError::NotFound);
    }

    let body = response.bytes().await?;
    if status.as_u16() >= 300 {
      return Err(RegistryError::Api {
        method: method.to_string(),
        path,
        message: String::from_utf8_lossy(&body).trim().to_string(),
      });
    }

    Ok(body.to_vec())
  }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
  async fn upload(&self, user: &str, name: &str, version: &str, path: &Path) -> Result<UploadResponse, RegistryError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| RegistryError::ReadArtifact {
      path: path.display().to_string(),
      source,
    })?;
    let file_name = path
      .file_name()
      .map(|n| n.to_string_lossy().to_string())
      .unwrap_or_else(|| format!("{name}.lpk"));

    info!(user, name, version, size = bytes.len(), "uploading artifact");

    let part = Part::bytes(bytes)
      .file_name(file_name)
      .mime_str("application/octet-stream")?;
    let form = Form::new()
      .text("uid", user.to_string())
      .text("name", name.to_string())
      .text("version", version.to_string())
      .part("file", part);

    let segments = ["v1", "lpks"];
    let request = self.http.post(self.url(&segments)).multipart(form);
    let body = self.send(Method::POST, &segments, request).await?;

    serde_json::from_slice(&body).map_err(|_| RegistryError::UnexpectedPayload {
      what: "upload",
      body: String::from_utf8_lossy(&body).to_string(),
    })
  }

  async fn delete(&self, upload_id: &str) -> Result<(), RegistryError> {
    let segments = ["v1", "lpks", upload_id];
    let request = self.http.delete(self.url(&segments));
    self.send(Method::DELETE, &segments, request).await?;
    Ok(())
  }

  async fn list_users(&self) -> Result<Vec<RegistryUser>, RegistryError> {
    let segments = ["v1", "users"];
    let request = self.http.get(self.url(&segments));
    let body = self.send(Method::GET, &segments, request).await?;

    if let Ok(detailed) = serde_json::from_slice::<Vec<RegistryUser>>(&body) {
      return Ok(detailed);
    }
    if let Ok(simple) = serde_json::from_slice::<Vec<String>>(&body) {
      return Ok(
        simple
          .into_iter()
          .map(|uid| RegistryUser {
            uid,
            nickname: String::new(),
          })
          .collect(),
      );
    }

    Err(RegistryError::UnexpectedPayload {
      what: "users",
      body: String::from_utf8_lossy(&body).to_string(),
    })
  }
}
