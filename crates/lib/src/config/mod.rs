//! Build description loading.
//!
//! A build description is a TOML file (`lpkbuild.toml` by default):
//!
//! ```toml
//! [source.local]
//! path = "./app"
//!
//! [build]
//! command = "npx lzc-cli project build ."
//!
//! [publish]
//! enabled = false
//!
//! [env]
//! template_extension = ".j2"
//!
//! [env.variables]
//! DOMAIN = "example.com"
//! TOKEN = { env = "APP_TOKEN" }
//! ```
//!
//! Relative local paths are resolved against the directory containing the
//! description file, and `~` expands to the home directory.

mod types;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub use types::*;

/// Errors that can occur while loading a build description.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("build description not found: {}", path.display())]
  NotFound { path: PathBuf },

  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: Box<toml::de::Error>,
  },

  #[error("HOME is not set, cannot expand '{0}'")]
  NoHome(String),
}

impl BuildSpec {
  /// Parse a build description from TOML text without touching local paths.
  pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
    toml::from_str(content)
  }

  /// Load a build description from disk, resolving a relative local source
  /// path against the file's directory.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        return Err(ConfigError::NotFound {
          path: path.to_path_buf(),
        });
      }
      Err(source) => {
        return Err(ConfigError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };

    let mut spec = Self::from_toml(&content).map_err(|e| ConfigError::Parse {
      path: path.to_path_buf(),
      source: Box::new(e),
    })?;

    let config_dir = path
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .unwrap_or_else(|| Path::new("."));
    let config_dir = dunce::canonicalize(config_dir).unwrap_or_else(|_| config_dir.to_path_buf());

    if let Some(local) = spec.source.local.as_mut()
      && !local.path.is_empty()
    {
      let resolved = resolve_path(&local.path, &config_dir)?;
      debug!(path = %resolved.display(), "resolved local source path");
      local.path = resolved.to_string_lossy().to_string();
    }

    Ok(spec)
  }
}

/// Resolve a path string from a build description.
///
/// Handles:
/// - Tilde expansion (`~` -> home directory)
/// - Relative paths (resolved against `config_dir`)
///
/// Existence is not checked here; a missing directory surfaces later as a
/// manifest error naming the full path.
pub fn resolve_path(path_str: &str, config_dir: &Path) -> Result<PathBuf, ConfigError> {
  let expanded = if let Some(rest) = path_str.strip_prefix("~/") {
    home_dir(path_str)?.join(rest)
  } else if path_str == "~" {
    home_dir(path_str)?
  } else if Path::new(path_str).is_absolute() {
    PathBuf::from(path_str)
  } else {
    config_dir.join(path_str)
  };

  Ok(dunce::canonicalize(&expanded).unwrap_or(expanded))
}

fn home_dir(path_str: &str) -> Result<PathBuf, ConfigError> {
  #[cfg(windows)]
  let var = "USERPROFILE";
  #[cfg(not(windows))]
  let var = "HOME";

  std::env::var_os(var)
    .map(PathBuf::from)
    .ok_or_else(|| ConfigError::NoHome(path_str.to_string()))
}
