//! Source resolution.
//!
//! Turns a source description into a working directory:
//! - `Local`: the configured directory, used in place
//! - `Git`: a fresh clone in an ephemeral staging directory, optionally
//!   checked out at a ref and narrowed to a subpath
//!
//! The staging directory is owned by the returned [`ResolvedSource`] and
//! removed by [`ResolvedSource::cleanup`], or on drop if the caller bails out
//! early (including cancellation of the surrounding task).

use std::io;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::consts::GIT_CHECKOUT_DIR;
use crate::exec::{CommandError, CommandRunner, Invocation};

/// Errors that can occur while resolving a source.
#[derive(Debug, Error)]
pub enum SourceError {
  /// The source description is malformed or contradictory.
  #[error("invalid source: {0}")]
  Config(String),

  /// Failed to create the ephemeral staging directory.
  #[error("failed to create staging directory: {0}")]
  Staging(#[source] io::Error),

  /// `git clone` failed.
  #[error("git clone of '{url}' failed: {source}")]
  Clone {
    url: String,
    #[source]
    source: CommandError,
  },

  /// `git checkout` failed.
  #[error("git checkout of '{rev}' failed: {source}")]
  Checkout {
    rev: String,
    #[source]
    source: CommandError,
  },

  /// The configured subpath is not a directory inside the checkout.
  #[error("subpath '{subpath}' is not a directory in the checkout of '{url}'")]
  SubpathNotFound { url: String, subpath: String },
}

impl SourceError {
  /// Whether this is a configuration problem rather than an acquisition failure.
  pub fn is_config(&self) -> bool {
    matches!(self, SourceError::Config(_))
  }
}

/// A validated source: exactly one variant is populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
  Local {
    path: PathBuf,
  },
  Git {
    url: String,
    rev: Option<String>,
    subpath: Option<PathBuf>,
  },
}

impl SourceDescriptor {
  /// Validate a raw source block. Performs no I/O.
  pub fn from_config(config: &SourceConfig) -> Result<Self, SourceError> {
    match (&config.local, &config.git) {
      (Some(_), Some(_)) => Err(SourceError::Config(
        "source.local and source.git are mutually exclusive".to_string(),
      )),
      (None, None) => Err(SourceError::Config(
        "either source.local or source.git must be provided".to_string(),
      )),
      (Some(local), None) => {
        if local.path.is_empty() {
          return Err(SourceError::Config("local.path must be set".to_string()));
        }
        Ok(SourceDescriptor::Local {
          path: PathBuf::from(&local.path),
        })
      }
      (None, Some(git)) => {
        if git.url.is_empty() {
          return Err(SourceError::Config("git.url must be set".to_string()));
        }
        let subpath = git
          .subpath
          .as_deref()
          .filter(|s| !s.is_empty())
          .map(validate_subpath)
          .transpose()?;
        Ok(SourceDescriptor::Git {
          url: git.url.clone(),
          rev: git.rev.clone().filter(|r| !r.is_empty()),
          subpath,
        })
      }
    }
  }
}

/// A subpath must stay inside the checkout: relative, no `..`.
fn validate_subpath(subpath: &str) -> Result<PathBuf, SourceError> {
  let path = PathBuf::from(subpath);
  let escapes = path
    .components()
    .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
  if escapes {
    return Err(SourceError::Config(format!(
      "git.subpath '{subpath}' must be a relative path inside the repository"
    )));
  }
  Ok(path)
}

/// A resolved working directory and the staging directory backing it, if any.
#[derive(Debug)]
pub struct ResolvedSource {
  workdir: PathBuf,
  staging: Option<TempDir>,
}

impl ResolvedSource {
  pub fn workdir(&self) -> &Path {
    &self.workdir
  }

  /// Whether the working directory lives in an ephemeral clone.
  pub fn is_ephemeral(&self) -> bool {
    self.staging.is_some()
  }

  /// Remove the ephemeral staging directory, if any.
  pub fn cleanup(mut self) {
    if let Some(staging) = self.staging.take() {
      let path = staging.path().to_path_buf();
      match staging.close() {
        Ok(()) => debug!(path = %path.display(), "removed staging directory"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove staging directory"),
      }
    }
  }
}

/// Resolve a source descriptor into a working directory.
pub async fn resolve(descriptor: &SourceDescriptor, runner: &dyn CommandRunner) -> Result<ResolvedSource, SourceError> {
  match descriptor {
    SourceDescriptor::Local { path } => {
      debug!(path = %path.display(), "using local source");
      Ok(ResolvedSource {
        workdir: path.clone(),
        staging: None,
      })
    }
    SourceDescriptor::Git { url, rev, subpath } => {
      let staging = tempfile::Builder::new()
        .prefix("lpk-build-")
        .tempdir()
        .map_err(SourceError::Staging)?;

      // Dropping `staging` on any early return removes the partial clone.
      let repo_path = staging.path().join(GIT_CHECKOUT_DIR);

      info!(url = %url, staging = %staging.path().display(), "cloning repository");
      let clone = Invocation::new("git", staging.path()).args(["clone", url.as_str(), GIT_CHECKOUT_DIR]);
      runner.run(&clone).await.map_err(|source| SourceError::Clone {
        url: url.clone(),
        source,
      })?;

      if let Some(rev) = rev {
        info!(rev = %rev, "checking out revision");
        let checkout = Invocation::new("git", &repo_path).args(["checkout", rev.as_str()]);
        runner.run(&checkout).await.map_err(|source| SourceError::Checkout {
          rev: rev.clone(),
          source,
        })?;
      }

      let workdir = match subpath {
        Some(sub) => {
          let dir = repo_path.join(sub);
          if !dir.is_dir() {
            return Err(SourceError::SubpathNotFound {
              url: url.clone(),
              subpath: sub.display().to_string(),
            });
          }
          dir
        }
        None => repo_path,
      };

      Ok(ResolvedSource {
        workdir,
        staging: Some(staging),
      })
    }
  }
}
