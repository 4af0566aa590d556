//! Implementation of the `lpk destroy` command.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use lpkbuild_lib::adapter::BuildResource;

use super::Context;
use crate::output::{print_info, print_json, print_stat, print_success};

/// Delete the recorded upload and local artifact, then clear the state.
///
/// The build description is not read; everything needed lives in the state.
pub async fn cmd_destroy(ctx: &Context, config: &Path, state: Option<PathBuf>) -> Result<()> {
  let pipeline = ctx.pipeline().await?;
  let resource = BuildResource::new(&pipeline, ctx.state_file(config, state));

  let destroyed = resource.delete().await.context("Destroy failed")?;

  if ctx.output.is_json() {
    return print_json(&serde_json::json!({ "destroyed": destroyed }));
  }

  match destroyed {
    None => print_info("Nothing to destroy."),
    Some(result) => {
      print_success("Destroy complete");
      print_stat("ID", &result.id);
      print_stat("Artifact removed", &result.artifact_path.display().to_string());
      if let Some(id) = &result.upload_id {
        print_stat("Upload deleted", id);
      }
    }
  }
  Ok(())
}
