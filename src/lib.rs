//! Crossbuild - a cross-compilation build orchestrator
//!
//! This crate provides the core library functionality for Crossbuild:
//! toolchain contexts for host and target, cache-checked native dependency
//! builds, application builds, runtime library collection and packaging.

pub mod builder;
pub mod core;
pub mod ops;
pub mod sources;
pub mod util;

/// Test utilities and mocks for Crossbuild unit tests.
///
/// This module is only available when compiling with `--cfg test`. It
/// provides a fake subprocess runner and manifest fixtures.
#[cfg(test)]
pub mod test_support;

pub use builder::errors::PipelineError;
pub use builder::toolchain::{resolve_contexts, ToolchainContext, ToolchainRole};
pub use core::{
    application::Application, artifact::RuntimeArtifact, manifest::Manifest,
    platform::TargetPlatform, step::BuildStep,
};
pub use ops::pipeline::{run_pipeline, PipelineOptions, PipelineSummary};
pub use util::context::GlobalContext;
