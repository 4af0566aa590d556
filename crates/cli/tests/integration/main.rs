//! CLI integration tests.
//!
//! Build commands run through `/bin/sh`, so these only run on Unix.

#![cfg(unix)]

mod apply_tests;
mod build_tests;
mod common;
mod destroy_tests;
mod status_tests;
