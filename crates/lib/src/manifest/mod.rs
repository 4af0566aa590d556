//! Application manifest (`lzc-manifest.yml`) reading.
//!
//! Only the identity fields are read; every other key is ignored.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::Value;
use thiserror::Error;

use crate::consts::MANIFEST_FILENAME;

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse manifest {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("manifest {} is missing required field '{field}'", path.display())]
  MissingField { path: PathBuf, field: &'static str },
}

/// Identity of an application as declared by its manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
  pub name: String,
  pub version: String,
  /// May be empty.
  pub app_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawManifest {
  #[serde(default)]
  name: Option<Value>,
  #[serde(default)]
  version: Option<Value>,
  #[serde(default)]
  appid: Option<Value>,
}

/// A manifest together with the exact bytes it was parsed from.
#[derive(Debug, Clone)]
pub struct ManifestFile {
  pub path: PathBuf,
  pub manifest: Manifest,
  pub bytes: Vec<u8>,
}

impl ManifestFile {
  /// Read the manifest at its fixed location inside `workdir`.
  pub fn read_in(workdir: &Path) -> Result<Self, ManifestError> {
    Self::read(&workdir.join(MANIFEST_FILENAME))
  }

  pub fn read(path: &Path) -> Result<Self, ManifestError> {
    let bytes = fs::read(path).map_err(|source| ManifestError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let manifest = Manifest::parse(&bytes, path)?;
    Ok(Self {
      path: path.to_path_buf(),
      manifest,
      bytes,
    })
  }
}

impl Manifest {
  /// Parse manifest bytes. `path` is only used in error messages.
  ///
  /// Scalar values are accepted for every field. Numbers keep their written
  /// form, so `version: 1.10` reads as `"1.10"`, not `"1.1"`.
  pub fn parse(bytes: &[u8], path: &Path) -> Result<Self, ManifestError> {
    let raw: Option<RawManifest> = serde_yaml::from_slice(bytes).map_err(|source| ManifestError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    // An empty document deserializes to None.
    let raw = raw.unwrap_or_default();
    let document = std::str::from_utf8(bytes).ok();
    let text = |field: &str| document.and_then(|d| plain_scalar_text(d, field));

    let required = |value: Option<Value>, field: &'static str| {
      scalar_string(value, text(field))
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ManifestError::MissingField {
          path: path.to_path_buf(),
          field,
        })
    };

    Ok(Self {
      name: required(raw.name, "name")?,
      version: required(raw.version, "version")?,
      app_id: scalar_string(raw.appid, text("appid")).unwrap_or_default(),
    })
  }
}

/// Read and parse a manifest file.
pub fn read_manifest(path: &Path) -> Result<Manifest, ManifestError> {
  ManifestFile::read(path).map(|file| file.manifest)
}

/// `source` is the scalar as written, used for numbers since `Value::Number`
/// normalises them.
fn scalar_string(value: Option<Value>, source: Option<&str>) -> Option<String> {
  match value? {
    Value::String(s) => Some(s),
    Value::Number(n) => Some(source.map_or_else(|| n.to_string(), str::to_string)),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

/// Text of a top-level block-style `field: value` entry with any trailing
/// comment removed. Flow-style documents yield `None`.
fn plain_scalar_text<'a>(document: &'a str, field: &str) -> Option<&'a str> {
  let keys = [field.to_string(), format!("\"{field}\""), format!("'{field}'")];
  document.lines().find_map(|line| {
    let rest = keys.iter().find_map(|key| line.strip_prefix(key.as_str()))?;
    let value = rest.trim_start().strip_prefix(':')?;
    let value = match value.find(" #") {
      Some(comment) => &value[..comment],
      None => value,
    };
    Some(value.trim()).filter(|v| !v.is_empty())
  })
}
