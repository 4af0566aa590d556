//! Implementation of the `lpk apply` command.
//!
//! Builds through the resource adapter so the recorded upload is reused when
//! the artifact is unchanged, then records the new result.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use lpkbuild_lib::adapter::BuildResource;
use lpkbuild_lib::pipeline::PublishStatus;

use super::{Context, print_outcome};
use crate::output::{print_info, print_stat, print_success};

pub async fn cmd_apply(ctx: &Context, config: &Path, state: Option<PathBuf>) -> Result<()> {
  let spec = ctx.load_spec(config)?;
  let pipeline = ctx.pipeline().await?;
  let resource = BuildResource::new(&pipeline, ctx.state_file(config, state));

  let outcome = resource.apply(&spec).await.context("Apply failed")?;

  if !ctx.output.is_json() {
    print_success("Apply complete");
    if outcome.cache_hit {
      print_info("Artifact unchanged, build command skipped");
    }
    match outcome.publish {
      PublishStatus::Disabled => print_info("Publishing disabled"),
      PublishStatus::Uploaded => print_info("Artifact uploaded"),
      PublishStatus::Reused => print_info("Upload reused"),
    }
    print_stat("State", &resource.state().path().display().to_string());
  }
  print_outcome(ctx.output, &outcome)
}
