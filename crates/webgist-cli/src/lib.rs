//! `webgist` crate (library surface).
//!
//! The primary entrypoint for end users is the `webgist` binary. This module
//! re-exports the pipeline crates for embedding without depending on the
//! internal crate layout.

pub use webgist_core as core;
pub use webgist_local as local;
