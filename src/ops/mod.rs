//! High-level operations.
//!
//! This module contains the implementation of the crossbuild commands.

pub mod cache;
pub mod collect;
pub mod package;
pub mod pipeline;

pub use cache::{cache_status, invalidate, CacheEntry, CacheState};
pub use collect::{CollectReport, RuntimeCollector};
pub use package::assemble;
pub use pipeline::{planned_steps, run_pipeline, AppStatus, PipelineOptions, PipelineSummary};
