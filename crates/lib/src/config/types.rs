use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_BUILD_COMMAND, DEFAULT_TEMPLATE_EXTENSION};

/// A complete build description.
///
/// Only `source` is required; every other block may be absent and falls back
/// to documented defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSpec {
  pub source: SourceConfig,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub build: Option<BuildConfig>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub publish: Option<PublishConfig>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub env: Option<EnvConfig>,
}

/// Raw source block. Exactly one of `local` or `git` must be set; this is
/// checked by [`crate::source::SourceDescriptor::from_config`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub local: Option<LocalSource>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub git: Option<GitSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalSource {
  pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitSource {
  pub url: String,
  /// Branch, tag or commit. Defaults to the repository's default branch.
  #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
  pub rev: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub subpath: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
  /// Build command, run through a shell inside the working directory.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub command: Option<String>,
  /// Shell used to run `command`. Defaults to `/bin/sh` (PowerShell on Windows).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub shell: Option<String>,
}

impl BuildConfig {
  pub fn command_or_default(config: Option<&Self>) -> &str {
    config
      .and_then(|c| non_empty(c.command.as_deref()))
      .unwrap_or(DEFAULT_BUILD_COMMAND)
  }

  pub fn shell(config: Option<&Self>) -> Option<&str> {
    config.and_then(|c| non_empty(c.shell.as_deref()))
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishConfig {
  /// Absent means "publish".
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub enabled: Option<bool>,
  /// Upload name override.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  /// Upload version override.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
}

impl PublishConfig {
  pub fn name_override(config: Option<&Self>) -> Option<&str> {
    config.and_then(|c| non_empty(c.name.as_deref()))
  }

  pub fn version_override(config: Option<&Self>) -> Option<&str> {
    config.and_then(|c| non_empty(c.version.as_deref()))
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvConfig {
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub variables: BTreeMap<String, VariableValue>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub template_extension: Option<String>,
}

/// A template/build variable: either a literal, or a reference to the process
/// environment resolved when the variables are collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
  Literal(String),
  FromEnv { env: String },
}

impl VariableValue {
  /// The concrete value, or `None` when it refers to an unset variable.
  pub fn resolve(&self) -> Option<String> {
    match self {
      VariableValue::Literal(value) => Some(value.clone()),
      VariableValue::FromEnv { env } => std::env::var(env).ok(),
    }
  }
}

/// Variables made available to templates and the build command.
pub type Variables = BTreeMap<String, String>;

impl EnvConfig {
  /// Collect set variables; entries that resolve to nothing are omitted.
  pub fn collect_variables(config: Option<&Self>) -> Variables {
    let Some(config) = config else {
      return Variables::new();
    };
    config
      .variables
      .iter()
      .filter_map(|(key, value)| value.resolve().map(|v| (key.clone(), v)))
      .collect()
  }

  /// Template extension, normalized to start with a single leading dot.
  pub fn template_extension(config: Option<&Self>) -> String {
    normalize_extension(config.and_then(|c| c.template_extension.as_deref()))
  }
}

/// Normalize a template extension: trims whitespace, falls back to `.tmpl`
/// when empty, and guarantees a single leading dot (`j2` and `.j2` are equal).
pub fn normalize_extension(ext: Option<&str>) -> String {
  let ext = ext.map(str::trim).unwrap_or_default();
  let ext = ext.trim_start_matches('.');
  if ext.is_empty() {
    return DEFAULT_TEMPLATE_EXTENSION.to_string();
  }
  format!(".{ext}")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
  value.filter(|v| !v.is_empty())
}
