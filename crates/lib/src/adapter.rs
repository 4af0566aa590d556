//! Lifecycle adapters over the single [`Pipeline`] implementation.
//!
//! - [`BuildDataSource`]: read-only; every read is a fresh run with no prior
//!   state, so it never reuses an upload.
//! - [`BuildResource`]: create/update/delete with the last result persisted in
//!   a [`StateFile`], so unchanged artifacts are not uploaded again.

use thiserror::Error;
use tracing::info;

use crate::config::BuildSpec;
use crate::pipeline::{ApplyOutcome, Pipeline, PipelineError, PipelineResult};
use crate::state::{StateError, StateFile};

#[derive(Debug, Error)]
pub enum ResourceError {
  #[error(transparent)]
  Pipeline(#[from] PipelineError),

  #[error(transparent)]
  State(#[from] StateError),
}

pub struct BuildDataSource<'a> {
  pipeline: &'a Pipeline,
}

impl<'a> BuildDataSource<'a> {
  pub fn new(pipeline: &'a Pipeline) -> Self {
    Self { pipeline }
  }

  pub async fn read(&self, spec: &BuildSpec) -> Result<ApplyOutcome, PipelineError> {
    self.pipeline.apply(spec, None).await
  }
}

pub struct BuildResource<'a> {
  pipeline: &'a Pipeline,
  state: StateFile,
}

impl<'a> BuildResource<'a> {
  pub fn new(pipeline: &'a Pipeline, state: StateFile) -> Self {
    Self { pipeline, state }
  }

  pub fn state(&self) -> &StateFile {
    &self.state
  }

  /// Run with no prior state and persist the result.
  pub async fn create(&self, spec: &BuildSpec) -> Result<ApplyOutcome, ResourceError> {
    self.run(spec, None).await
  }

  /// Run against the persisted result and persist the new one.
  pub async fn update(&self, spec: &BuildSpec) -> Result<ApplyOutcome, ResourceError> {
    let prior = self.state.load()?;
    self.run(spec, prior.as_ref()).await
  }

  /// Create when nothing is persisted, otherwise update.
  pub async fn apply(&self, spec: &BuildSpec) -> Result<ApplyOutcome, ResourceError> {
    match self.state.load()? {
      None => self.run(spec, None).await,
      Some(prior) => self.run(spec, Some(&prior)).await,
    }
  }

  pub fn read(&self) -> Result<Option<PipelineResult>, StateError> {
    self.state.load()
  }

  /// Tear down the persisted result and clear the state. Returns what was
  /// destroyed, or `None` when nothing was persisted.
  pub async fn delete(&self) -> Result<Option<PipelineResult>, ResourceError> {
    let Some(prior) = self.state.load()? else {
      info!(path = %self.state.path().display(), "nothing to destroy");
      return Ok(None);
    };

    self.pipeline.teardown(&prior).await?;
    self.state.clear()?;
    Ok(Some(prior))
  }

  async fn run(&self, spec: &BuildSpec, prior: Option<&PipelineResult>) -> Result<ApplyOutcome, ResourceError> {
    let outcome = self.pipeline.apply(spec, prior).await?;
    self.state.save(&outcome.result)?;
    Ok(outcome)
  }
}
