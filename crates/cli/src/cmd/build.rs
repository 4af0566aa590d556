//! Implementation of the `lpk build` command.
//!
//! A one-shot run through the data-source adapter: nothing is recorded, so an
//! enabled publish always uploads.

use std::path::Path;

use anyhow::{Context as _, Result};

use lpkbuild_lib::adapter::BuildDataSource;
use lpkbuild_lib::pipeline::PublishStatus;

use super::{Context, print_outcome};
use crate::output::{print_info, print_success};

pub async fn cmd_build(ctx: &Context, config: &Path) -> Result<()> {
  let spec = ctx.load_spec(config)?;
  let pipeline = ctx.pipeline().await?;

  let outcome = BuildDataSource::new(&pipeline).read(&spec).await.context("Build failed")?;

  if !ctx.output.is_json() {
    print_success("Build complete");
    if outcome.cache_hit {
      print_info("Artifact unchanged, build command skipped");
    }
    if outcome.publish == PublishStatus::Uploaded {
      print_info("Artifact uploaded");
    }
  }
  print_outcome(ctx.output, &outcome)
}
