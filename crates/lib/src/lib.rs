//! lpkbuild-lib: the LPK build pipeline
//!
//! Turns a source tree (local directory or git repository) into a
//! content-addressed `.lpk` artifact and optionally publishes it:
//! - `source`: resolve the working directory, cloning if needed
//! - `template`: render `*.tmpl` files against the configured variables
//! - `manifest`: read the application identity from `lzc-manifest.yml`
//! - `artifact`: build, or reuse, the artifact named after the manifest hash
//! - `publish`: upload, or reuse an identical earlier upload
//! - `pipeline`: run the stages in order and tear down their results
//! - `adapter`: data-source and resource lifecycles over the pipeline

pub mod adapter;
pub mod artifact;
pub mod config;
pub mod consts;
pub mod exec;
pub mod manifest;
pub mod pipeline;
pub mod publish;
pub mod registry;
pub mod source;
pub mod state;
pub mod template;
pub mod util;
