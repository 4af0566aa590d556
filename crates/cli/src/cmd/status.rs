//! Status command implementation.
//!
//! Displays the recorded pipeline result without touching the network.

use std::path::{Path, PathBuf};

use anyhow::Result;

use super::{Context, print_result_stats};
use crate::output::{print_info, print_json, print_stat, print_success, print_warning};

pub fn cmd_status(ctx: &Context, config: &Path, state: Option<PathBuf>) -> Result<()> {
  let state = ctx.state_file(config, state);
  let recorded = state.load()?;

  if ctx.output.is_json() {
    return print_json(&serde_json::json!({
      "state": state.path(),
      "resource": recorded,
    }));
  }

  let Some(result) = recorded else {
    print_info("No recorded build. Run 'lpk apply' to create one.");
    return Ok(());
  };

  print_success(&format!("Recorded build: {}", result.id));
  print_stat("State", &state.path().display().to_string());
  println!();
  print_result_stats(&result);
  if !result.artifact_path.exists() {
    println!();
    print_warning("Artifact file is missing");
  }
  Ok(())
}
