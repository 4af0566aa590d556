//! Test doubles for the process runner and the registry.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::exec::{CommandError, CommandOutput, CommandRunner, Invocation};
use crate::registry::{RegistryClient, RegistryError, RegistryUser, UploadResponse};

#[derive(Debug, Clone)]
enum Effect {
  CreateDir(PathBuf),
  WriteFile(PathBuf, Vec<u8>),
}

/// What a scripted command does when it runs. Paths are relative to the
/// invocation's working directory.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
  effects: Vec<Effect>,
  failure: Option<(i32, String)>,
}

impl Outcome {
  pub fn succeed() -> Self {
    Self::default()
  }

  pub fn create_dir(path: impl Into<PathBuf>) -> Self {
    Self::default().and_create_dir(path)
  }

  pub fn write_file(path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
    Self::default().and_write_file(path, bytes)
  }

  pub fn fail(code: i32, stderr: &str) -> Self {
    Self {
      effects: Vec::new(),
      failure: Some((code, stderr.to_string())),
    }
  }

  pub fn and_create_dir(mut self, path: impl Into<PathBuf>) -> Self {
    self.effects.push(Effect::CreateDir(path.into()));
    self
  }

  pub fn and_write_file(mut self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
    self.effects.push(Effect::WriteFile(path.into(), bytes.into()));
    self
  }

  fn apply(&self, cwd: &Path, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
    for effect in &self.effects {
      match effect {
        Effect::CreateDir(rel) => fs::create_dir_all(cwd.join(rel)).expect("fake runner: create dir"),
        Effect::WriteFile(rel, bytes) => {
          let path = cwd.join(rel);
          if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("fake runner: create parent");
          }
          fs::write(path, bytes).expect("fake runner: write file");
        }
      }
    }

    match &self.failure {
      Some((code, stderr)) => Err(CommandError::Failed {
        command: invocation.display(),
        code: Some(*code),
        stderr: stderr.clone(),
      }),
      None => Ok(CommandOutput::default()),
    }
  }
}

/// A [`CommandRunner`] that records invocations and plays scripted outcomes.
///
/// The first rule whose pattern is a substring of [`Invocation::display`]
/// wins. Unmatched invocations succeed without side effects.
#[derive(Debug, Default)]
pub struct FakeRunner {
  rules: Vec<(String, Outcome)>,
  calls: Mutex<Vec<Invocation>>,
}

impl FakeRunner {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn on(mut self, pattern: &str, outcome: Outcome) -> Self {
    self.rules.push((pattern.to_string(), outcome));
    self
  }

  pub fn invocations(&self) -> Vec<Invocation> {
    self.calls.lock().unwrap().clone()
  }

  /// Number of recorded invocations whose display contains `pattern`.
  pub fn count(&self, pattern: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|inv| inv.display().contains(pattern))
      .count()
  }
}

#[async_trait]
impl CommandRunner for FakeRunner {
  async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
    self.calls.lock().unwrap().push(invocation.clone());

    let display = invocation.display();
    match self.rules.iter().find(|(pattern, _)| display.contains(pattern.as_str())) {
      Some((_, outcome)) => outcome.apply(&invocation.cwd, invocation),
      None => Ok(CommandOutput::default()),
    }
  }
}

/// A recorded upload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCall {
  pub user: String,
  pub name: String,
  pub version: String,
  pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeleteBehavior {
  #[default]
  Ok,
  NotFound,
  Fail,
}

/// In-memory [`RegistryClient`].
///
/// Uploads answer with `upload-{n}` ids and empty hash/version (so local
/// values are kept) unless a fixed response is configured.
#[derive(Debug, Default)]
pub struct FakeRegistry {
  uploads: Mutex<Vec<UploadCall>>,
  deletes: Mutex<Vec<String>>,
  response: Option<UploadResponse>,
  upload_error: Option<String>,
  delete_behavior: DeleteBehavior,
  users: Vec<RegistryUser>,
}

impl FakeRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_response(mut self, response: UploadResponse) -> Self {
    self.response = Some(response);
    self
  }

  pub fn failing_uploads(mut self, message: &str) -> Self {
    self.upload_error = Some(message.to_string());
    self
  }

  pub fn with_deletes(mut self, behavior: DeleteBehavior) -> Self {
    self.delete_behavior = behavior;
    self
  }

  pub fn with_users(mut self, uids: &[&str]) -> Self {
    self.users = uids
      .iter()
      .map(|uid| RegistryUser {
        uid: uid.to_string(),
        nickname: String::new(),
      })
      .collect();
    self
  }

  pub fn uploads(&self) -> Vec<UploadCall> {
    self.uploads.lock().unwrap().clone()
  }

  pub fn deletes(&self) -> Vec<String> {
    self.deletes.lock().unwrap().clone()
  }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
  async fn upload(&self, user: &str, name: &str, version: &str, path: &Path) -> Result<UploadResponse, RegistryError> {
    if let Some(message) = &self.upload_error {
      return Err(RegistryError::Api {
        method: "POST".to_string(),
        path: "/v1/lpks".to_string(),
        message: message.clone(),
      });
    }

    let mut uploads = self.uploads.lock().unwrap();
    uploads.push(UploadCall {
      user: user.to_string(),
      name: name.to_string(),
      version: version.to_string(),
      path: path.to_path_buf(),
    });

    Ok(self.response.clone().unwrap_or_else(|| {
      let id = format!("upload-{}", uploads.len());
      UploadResponse {
        download_url: format!("https://registry.test/lpks/{id}"),
        id,
        sha256: String::new(),
        version: String::new(),
      }
    }))
  }

  async fn delete(&self, upload_id: &str) -> Result<(), RegistryError> {
    self.deletes.lock().unwrap().push(upload_id.to_string());
    match self.delete_behavior {
      DeleteBehavior::Ok => Ok(()),
      DeleteBehavior::NotFound => Err(RegistryError::NotFound),
      DeleteBehavior::Fail => Err(RegistryError::Api {
        method: "DELETE".to_string(),
        path: format!("/v1/lpks/{upload_id}"),
        message: "registry unavailable".to_string(),
      }),
    }
  }

  async fn list_users(&self) -> Result<Vec<RegistryUser>, RegistryError> {
    Ok(self.users.clone())
  }
}
