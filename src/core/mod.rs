//! Core data structures for Crossbuild.
//!
//! This module contains the foundational types used throughout Crossbuild:
//! - Target platforms and their conventions
//! - Manifests, dependency declarations and applications
//! - Build steps and shipped artifacts

pub mod application;
pub mod artifact;
pub mod manifest;
pub mod platform;
pub mod step;

pub use application::{AppDriver, Application};
pub use artifact::{ArtifactKind, Package, RuntimeArtifact};
pub use manifest::{DependencySpec, Manifest, MANIFEST_NAME};
pub use platform::TargetPlatform;
pub use step::{BuildStep, BuildSystem, DependencyGraph, FetchSpec, StepState};
