//! Native dependency build steps.
//!
//! A [`BuildStep`] is one dependency built in one toolchain context: where
//! its sources come from, which build system drives it, where it installs,
//! and which file proves a previous run already completed.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::builder::toolchain::ToolchainRole;

/// Where a dependency's sources come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FetchSpec {
    /// A tarball verified against a SHA-256 checksum.
    Url {
        url: String,
        sha256: String,
        /// Leading directory stripped from every entry
        strip_prefix: Option<String>,
    },
    /// A git repository, optionally pinned to a revision.
    Git { url: String, rev: Option<String> },
    /// A local source directory.
    Path { path: PathBuf },
}

impl FetchSpec {
    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            FetchSpec::Url { url, .. } => url.clone(),
            FetchSpec::Git { url, rev } => match rev {
                Some(rev) => format!("{}#{}", url, rev),
                None => url.clone(),
            },
            FetchSpec::Path { path } => path.display().to_string(),
        }
    }
}

/// Argument lists of a custom build system.
///
/// Arguments may contain the placeholders `{prefix}`, `{src}`, `{build}` and
/// `{jobs}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomCommands {
    pub configure: Vec<String>,
    pub build: Vec<String>,
    pub install: Vec<String>,
}

/// Build system driving a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSystem {
    CMake,
    Autotools,
    Waf,
    Custom(CustomCommands),
}

impl BuildSystem {
    /// Parse a build system name (`cmake`, `autotools`, `waf`).
    ///
    /// `custom` needs its commands and is handled by the manifest loader.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "cmake" => Some(BuildSystem::CMake),
            "autotools" | "configure" => Some(BuildSystem::Autotools),
            "waf" => Some(BuildSystem::Waf),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuildSystem::CMake => "cmake",
            BuildSystem::Autotools => "autotools",
            BuildSystem::Waf => "waf",
            BuildSystem::Custom(_) => "custom",
        }
    }
}

/// One dependency built in one context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStep {
    /// Dependency id (`fftw`, `essentia`)
    pub id: String,
    /// Context the step is built in
    pub role: ToolchainRole,
    /// Source location
    pub fetch: FetchSpec,
    /// Build system
    pub build_system: BuildSystem,
    /// Extra arguments for the configure phase
    pub configure_args: Vec<String>,
    /// Replaces the build system's build command
    pub build_command: Option<Vec<String>>,
    /// Replaces the build system's install command
    pub install_command: Option<Vec<String>>,
    /// Install prefix of this step
    pub install_prefix: PathBuf,
    /// Absolute path whose existence means the step is complete
    pub cache_marker: PathBuf,
    /// Whether a failure aborts the pipeline
    pub required: bool,
    /// Extra linker flags
    pub ldflags: Vec<String>,
    /// Extra environment variables
    pub env: BTreeMap<String, String>,
    /// Installation whose headers this step may reuse
    pub reuse_prefix: Option<PathBuf>,
    /// Directory holding the fetched sources and the build tree
    pub work_dir: PathBuf,
}

impl BuildStep {
    /// Whether the cache marker exists.
    pub fn is_cached(&self) -> bool {
        self.cache_marker.exists()
    }

    /// Directory sources are fetched into.
    pub fn src_dir(&self) -> PathBuf {
        self.work_dir.join("src")
    }

    /// Out-of-tree build directory.
    pub fn build_dir(&self) -> PathBuf {
        self.work_dir.join("build")
    }

    /// Label used in logs and errors (`essentia (target)`).
    pub fn label(&self) -> String {
        format!("{} ({})", self.id, self.role)
    }

    /// Substitute the step placeholders in an argument.
    pub fn expand(&self, arg: &str, jobs: usize) -> String {
        arg.replace("{prefix}", &display(&self.install_prefix))
            .replace("{src}", &display(&self.src_dir()))
            .replace("{build}", &display(&self.build_dir()))
            .replace("{jobs}", &jobs.to_string())
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Lifecycle of a step within one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum StepState {
    Pending,
    /// Marker present, nothing ran
    Skipped,
    Building,
    Installed,
    Failed(String),
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepState::Pending => write!(f, "pending"),
            StepState::Skipped => write!(f, "cached"),
            StepState::Building => write!(f, "building"),
            StepState::Installed => write!(f, "installed"),
            StepState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Steps of one context, executed strictly in list order.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyGraph {
    pub context: ToolchainRole,
    pub steps: Vec<BuildStep>,
}

impl DependencyGraph {
    pub fn new(context: ToolchainRole, steps: Vec<BuildStep>) -> Self {
        DependencyGraph { context, steps }
    }
}
