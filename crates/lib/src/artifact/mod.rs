//! Content-addressed artifact building.
//!
//! The artifact path is derived from the manifest alone:
//! `{workdir}/{name}-{version}-{sha256(manifest bytes)}.lpk`. If a file already
//! exists there the build command is skipped. The cache key lives on the
//! filesystem, so hits survive process restarts.
//!
//! Only the manifest participates in the key: a source edit that leaves the
//! manifest untouched is a cache hit.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::{BuildConfig, PublishConfig, Variables};
use crate::consts::LPK_EXTENSION;
use crate::exec::{CommandError, CommandRunner, Invocation, command_environment, get_shell};
use crate::manifest::{Manifest, ManifestError, ManifestFile};
use crate::util::hash::{ContentHash, HashError, hash_bytes, hash_file};

#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Manifest(#[from] ManifestError),

  /// The build command exited unsuccessfully or could not be started.
  #[error("build command failed: {0}")]
  Command(#[source] CommandError),

  #[error("no .lpk artifact produced in {}", workdir.display())]
  NoArtifactProduced { workdir: PathBuf },

  #[error("failed to check artifact {}: {source}", path.display())]
  CheckArtifact {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to scan {} for artifacts: {source}", path.display())]
  Scan {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to rename artifact {} to {}: {source}", from.display(), to.display())]
  Rename {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Hash(#[from] HashError),
}

/// Facts about a realized artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMetadata {
  pub app_id: String,
  /// Manifest version unless overridden by `publish.version`.
  pub version: String,
  /// Hash of the artifact bytes.
  pub sha256: String,
  /// Derived base name unless overridden by `publish.name`.
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltArtifact {
  pub path: PathBuf,
  pub metadata: ArtifactMetadata,
  /// Whether the build command was skipped.
  pub cache_hit: bool,
}

/// Base name of the artifact: `{name}-{version}-{manifest_hash}`.
pub fn artifact_base_name(manifest: &Manifest, manifest_hash: &ContentHash) -> String {
  format!("{}-{}-{}", manifest.name, manifest.version, manifest_hash)
}

/// Build, or reuse, the artifact for the source tree at `workdir`.
pub async fn build(
  runner: &dyn CommandRunner,
  workdir: &Path,
  build: Option<&BuildConfig>,
  publish: Option<&PublishConfig>,
  variables: &Variables,
) -> Result<BuiltArtifact, BuildError> {
  let manifest_file = ManifestFile::read_in(workdir)?;
  let manifest = &manifest_file.manifest;
  let manifest_hash = hash_bytes(&manifest_file.bytes);

  let base_name = artifact_base_name(manifest, &manifest_hash);
  let artifact_path = workdir.join(format!("{base_name}.{LPK_EXTENSION}"));

  let cache_hit = tokio::fs::try_exists(&artifact_path)
    .await
    .map_err(|source| BuildError::CheckArtifact {
      path: artifact_path.clone(),
      source,
    })?;

  if cache_hit {
    info!(path = %artifact_path.display(), "artifact cache hit");
  } else {
    run_build_command(runner, workdir, build, variables).await?;

    let produced = find_latest_lpk(workdir)
      .map_err(|source| BuildError::Scan {
        path: workdir.to_path_buf(),
        source,
      })?
      .ok_or_else(|| BuildError::NoArtifactProduced {
        workdir: workdir.to_path_buf(),
      })?;

    if produced != artifact_path {
      debug!(from = %produced.display(), to = %artifact_path.display(), "renaming artifact");
      tokio::fs::rename(&produced, &artifact_path)
        .await
        .map_err(|source| BuildError::Rename {
          from: produced.clone(),
          to: artifact_path.clone(),
          source,
        })?;
    }
  }

  let sha256 = hash_file(&artifact_path)?;
  info!(path = %artifact_path.display(), sha256 = %sha256, "artifact ready");

  let metadata = ArtifactMetadata {
    app_id: manifest.app_id.clone(),
    version: PublishConfig::version_override(publish)
      .unwrap_or(&manifest.version)
      .to_string(),
    sha256: sha256.0,
    name: PublishConfig::name_override(publish)
      .map(str::to_string)
      .unwrap_or(base_name),
  };

  Ok(BuiltArtifact {
    path: artifact_path,
    metadata,
    cache_hit,
  })
}

async fn run_build_command(
  runner: &dyn CommandRunner,
  workdir: &Path,
  build: Option<&BuildConfig>,
  variables: &Variables,
) -> Result<(), BuildError> {
  let command = BuildConfig::command_or_default(build);
  let (shell, shell_args) = get_shell(BuildConfig::shell(build));

  let invocation = Invocation::new(shell, workdir)
    .args(shell_args)
    .arg(command)
    .with_env(command_environment(variables))
    .echo();

  info!(command, cwd = %workdir.display(), variables = variables.len(), "running build command");
  runner.run(&invocation).await.map_err(BuildError::Command)?;
  Ok(())
}

/// The most recently modified `*.lpk` file directly inside `dir`.
///
/// Files whose modification time cannot be read sort last; equal times fall
/// back to name order.
pub fn find_latest_lpk(dir: &Path) -> io::Result<Option<PathBuf>> {
  let suffix = format!(".{LPK_EXTENSION}");
  let mut candidates: Vec<(Option<SystemTime>, PathBuf)> = Vec::new();

  for entry in fs::read_dir(dir)? {
    let entry = entry?;
    let is_lpk = entry.file_name().to_str().is_some_and(|name| name.ends_with(&suffix));
    if !is_lpk || !entry.file_type()?.is_file() {
      continue;
    }
    let modified = entry.metadata().and_then(|m| m.modified()).ok();
    candidates.push((modified, entry.path()));
  }

  candidates.sort_by(|(a_time, a_path), (b_time, b_path)| b_time.cmp(a_time).then_with(|| a_path.cmp(b_path)));
  Ok(candidates.into_iter().next().map(|(_, path)| path))
}
