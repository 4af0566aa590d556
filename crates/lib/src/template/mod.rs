//! Template rendering over a source tree.
//!
//! Every regular file whose name ends with the template extension is rendered
//! into its sibling with the extension stripped (`config.yaml.tmpl` becomes
//! `config.yaml`). Templates use a Go `text/template` subset (conditionals,
//! `with`, `range`, variables and pipelines) over the variable map, and
//! referencing an undefined variable is an error.

mod exec;
mod parse;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::{Variables, normalize_extension};

pub use exec::ExecError;
pub use parse::ParseError;

/// A parsed template, ready to render against any variable map.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
  nodes: Vec<parse::Node>,
}

impl Template {
  pub fn parse(text: &str) -> Result<Self, ParseError> {
    parse::parse(text).map(|nodes| Self { nodes })
  }

  pub fn render(&self, variables: &Variables) -> Result<String, ExecError> {
    exec::execute(&self.nodes, variables)
  }
}

/// Mode given to rendered files when the template's own mode is unreadable.
#[cfg(unix)]
const DEFAULT_RENDERED_MODE: u32 = 0o644;

#[derive(Debug, Error)]
pub enum TemplateError {
  #[error("environment variable {key} not provided (template {})", path.display())]
  MissingVariable { path: PathBuf, key: String },

  #[error("failed to parse template {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: ParseError,
  },

  #[error("failed to render template {}: {source}", path.display())]
  Execute {
    path: PathBuf,
    #[source]
    source: ExecError,
  },

  #[error("failed to walk {}: {source}", path.display())]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("failed to read template {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {}: {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

impl TemplateError {
  /// The undefined variable, for missing-key failures.
  pub fn key(&self) -> Option<&str> {
    match self {
      TemplateError::MissingVariable { key, .. } => Some(key),
      _ => None,
    }
  }
}

/// Render every template under `workdir`. Returns the written output paths.
///
/// `extension` is normalized first, so `j2` and `.j2` are equivalent. A
/// missing `workdir` renders nothing.
pub fn render_tree(workdir: &Path, extension: &str, variables: &Variables) -> Result<Vec<PathBuf>, TemplateError> {
  let extension = normalize_extension(Some(extension));

  if !workdir.is_dir() {
    debug!(path = %workdir.display(), "workdir missing, no templates rendered");
    return Ok(Vec::new());
  }

  // Collect first so outputs written during rendering are never revisited.
  let mut templates = Vec::new();
  for entry in WalkDir::new(workdir).follow_links(false) {
    let entry = entry.map_err(|source| TemplateError::Walk {
      path: workdir.to_path_buf(),
      source,
    })?;
    if !entry.file_type().is_file() {
      continue;
    }

    let Some(name) = entry.file_name().to_str() else {
      continue;
    };
    let Some(stripped) = name.strip_suffix(extension.as_str()) else {
      continue;
    };
    if stripped.is_empty() {
      continue;
    }

    let output = entry.path().with_file_name(stripped);
    templates.push((entry.into_path(), output));
  }

  let mut rendered = Vec::with_capacity(templates.len());
  for (template, output) in templates {
    render_file(&template, &output, variables)?;
    rendered.push(output);
  }

  if !rendered.is_empty() {
    info!(count = rendered.len(), extension = %extension, "rendered templates");
  }
  Ok(rendered)
}

/// Render a single template into `output`.
///
/// The whole output is rendered before anything is written, then placed with
/// a temp-file rename so a failure never leaves a partial file.
pub fn render_file(template: &Path, output: &Path, variables: &Variables) -> Result<(), TemplateError> {
  let source = fs::read_to_string(template).map_err(|source| TemplateError::Read {
    path: template.to_path_buf(),
    source,
  })?;

  let parsed = Template::parse(&source).map_err(|source| TemplateError::Parse {
    path: template.to_path_buf(),
    source,
  })?;

  let text = parsed.render(variables).map_err(|e| match e {
    ExecError::MissingKey(key) => TemplateError::MissingVariable {
      path: template.to_path_buf(),
      key,
    },
    source => TemplateError::Execute {
      path: template.to_path_buf(),
      source,
    },
  })?;

  write_atomic(output, text.as_bytes(), template_permissions(template)).map_err(|source| TemplateError::Write {
    path: output.to_path_buf(),
    source,
  })?;

  debug!(template = %template.display(), output = %output.display(), "rendered template");
  Ok(())
}

fn write_atomic(path: &Path, contents: &[u8], permissions: Option<fs::Permissions>) -> io::Result<()> {
  let parent = path.parent().unwrap_or_else(|| Path::new("."));
  let mut temp = NamedTempFile::new_in(parent)?;
  temp.write_all(contents)?;
  temp.flush()?;
  if let Some(permissions) = permissions {
    fs::set_permissions(temp.path(), permissions)?;
  }
  temp.persist(path).map_err(|e| e.error)?;
  Ok(())
}

fn template_permissions(template: &Path) -> Option<fs::Permissions> {
  match fs::metadata(template) {
    Ok(meta) => Some(meta.permissions()),
    Err(_) => default_permissions(),
  }
}

#[cfg(unix)]
fn default_permissions() -> Option<fs::Permissions> {
  use std::os::unix::fs::PermissionsExt;
  Some(fs::Permissions::from_mode(DEFAULT_RENDERED_MODE))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<fs::Permissions> {
  None
}
