//! Applications built into shipped binaries.

use std::path::PathBuf;

use serde::Serialize;

use crate::builder::toolchain::ToolchainRole;

/// How an application's binary is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AppDriver {
    /// `cargo build --release --target <triple>`
    Cargo {
        /// Package selected with `-p`
        package: Option<String>,
        /// Features always enabled
        features: Vec<String>,
    },
    /// Direct compile and link with the context's compiler.
    Cc {
        sources: Vec<PathBuf>,
        libs: Vec<String>,
        cflags: Vec<String>,
        ldflags: Vec<String>,
        cxx: bool,
    },
    /// An arbitrary command run in the source directory.
    Command { argv: Vec<String> },
}

impl AppDriver {
    pub fn name(&self) -> &'static str {
        match self {
            AppDriver::Cargo { .. } => "cargo",
            AppDriver::Cc { .. } => "cc",
            AppDriver::Command { .. } => "command",
        }
    }
}

/// An application to build, collect and package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Application {
    /// Application name, also the archive's top-level directory
    pub name: String,
    /// Source directory of the compilation unit
    pub source_unit: PathBuf,
    /// Contexts the build needs; the first listed of target/host is primary
    pub contexts: Vec<ToolchainRole>,
    /// Dependency ids whose installations must be on the search path
    pub required_libraries: Vec<String>,
    /// Whether a failure only degrades the run
    pub optional: bool,
    /// Binary base name, without executable suffix
    pub binary: String,
    /// Binary location relative to `source_unit`, when not the driver default
    pub output: Option<PathBuf>,
    /// Driver producing the binary
    pub driver: AppDriver,
    /// Features enabled only in debug builds
    pub debug_features: Vec<String>,
    /// Glob patterns, relative to `source_unit`, of files shipped alongside
    pub data_files: Vec<String>,
}

impl Application {
    /// Whether the application needs a context.
    pub fn needs(&self, role: ToolchainRole) -> bool {
        self.contexts.contains(&role)
    }

    /// Context the binary is produced in.
    pub fn primary_context(&self) -> ToolchainRole {
        if self.needs(ToolchainRole::Target) || self.contexts.is_empty() {
            ToolchainRole::Target
        } else {
            ToolchainRole::Host
        }
    }

    /// Whether the build must wait for host-context dependencies.
    pub fn needs_host_stage(&self) -> bool {
        self.needs(ToolchainRole::Host)
    }
}
