//! Dependency sources.
//!
//! Sources of native dependencies come from verified tarballs, git
//! repositories or local directories.

pub mod fetch;

pub use fetch::{download_cached, extract_tarball, fetch_source};
