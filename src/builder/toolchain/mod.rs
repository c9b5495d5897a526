//! Toolchain contexts for host and target builds.
//!
//! A [`ToolchainContext`] is an immutable bundle of compiler paths, search
//! paths and environment overrides for one role. Build steps never see a
//! context through process-global state: the context is applied onto an
//! explicit [`Environment`] for the duration of one step and torn down again.
//!
//! Resolution priority for compiler paths:
//! 1. Toolchain config file (`.crossbuild/toolchain.toml` or `~/.crossbuild/toolchain.toml`)
//! 2. Built-in cross-compiler mapping for the requested platform

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::builder::env::{EnvGuard, Environment};
use crate::core::platform::TargetPlatform;

mod detect;
mod gcc;

pub use detect::{load_toolchain_config_from_files, resolve_contexts, ResolvedContexts};
pub use gcc::{link_exe_command, GccTools, LinkInput};

/// Which machine a context produces code for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolchainRole {
    /// Runs on the build machine (build scripts, code generators).
    Host,
    /// Runs on the destination platform (shipped binaries).
    Target,
}

impl ToolchainRole {
    /// Get the role name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolchainRole::Host => "host",
            ToolchainRole::Target => "target",
        }
    }
}

impl fmt::Display for ToolchainRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ToolchainRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "host" => Ok(ToolchainRole::Host),
            "target" => Ok(ToolchainRole::Target),
            _ => Err(format!("invalid role '{}'; expected 'host' or 'target'", s)),
        }
    }
}

/// Compiler and binutils paths of one toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilerPaths {
    pub cc: PathBuf,
    pub cxx: PathBuf,
    pub ar: PathBuf,
    pub ranlib: PathBuf,
    pub linker: PathBuf,
}

/// Compiler paths, search paths and environment for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainContext {
    /// Host or target
    pub role: ToolchainRole,
    /// Platform the produced code runs on
    pub platform: TargetPlatform,
    /// Compiler paths
    pub compilers: CompilerPaths,
    /// Tool used to list dynamic dependencies of produced binaries
    pub objdump: PathBuf,
    /// Sysroot of the cross toolchain, if any
    pub sysroot: Option<PathBuf>,
    /// Install prefixes searched for headers, libraries and pkg-config files
    pub search_paths: Vec<PathBuf>,
    /// Extra variables set while a step of this context runs
    pub env_overrides: BTreeMap<String, String>,
    /// Debug build configuration requested
    pub debug: bool,
}

impl ToolchainContext {
    /// Return a copy of this context with the given search paths appended.
    pub fn with_search_paths(&self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut ctx = self.clone();
        for path in paths {
            if !ctx.search_paths.contains(&path) {
                ctx.search_paths.push(path);
            }
        }
        ctx
    }

    /// Human-readable label used in logs (`target x86_64-w64-mingw32`).
    pub fn label(&self) -> String {
        format!("{} {}", self.role, self.platform.gnu_triple)
    }

    /// Include directories of all search paths.
    pub fn include_dirs(&self) -> Vec<PathBuf> {
        self.search_paths.iter().map(|p| p.join("include")).collect()
    }

    /// Library directories of all search paths.
    pub fn lib_dirs(&self) -> Vec<PathBuf> {
        self.search_paths.iter().map(|p| p.join("lib")).collect()
    }

    /// pkg-config directories of all search paths.
    pub fn pkgconfig_dirs(&self) -> Vec<PathBuf> {
        self.search_paths
            .iter()
            .map(|p| p.join("lib").join("pkgconfig"))
            .collect()
    }

    /// Variables describing this context to build systems.
    ///
    /// Target contexts set `PKG_CONFIG_LIBDIR` so pkg-config never falls back
    /// to the build machine's system directories; host contexts extend
    /// `PKG_CONFIG_PATH` instead.
    pub fn environment_overrides(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("CC".to_string(), path_str(&self.compilers.cc)),
            ("CXX".to_string(), path_str(&self.compilers.cxx)),
            ("AR".to_string(), path_str(&self.compilers.ar)),
            ("RANLIB".to_string(), path_str(&self.compilers.ranlib)),
            ("LD".to_string(), path_str(&self.compilers.linker)),
        ];

        if !self.search_paths.is_empty() {
            vars.push(("CPATH".to_string(), join_search_path(&self.include_dirs())));
            vars.push(("LIBRARY_PATH".to_string(), join_search_path(&self.lib_dirs())));
            let pkgconfig = join_search_path(&self.pkgconfig_dirs());
            match self.role {
                ToolchainRole::Target => vars.push(("PKG_CONFIG_LIBDIR".to_string(), pkgconfig)),
                ToolchainRole::Host => vars.push(("PKG_CONFIG_PATH".to_string(), pkgconfig)),
            }
        } else if self.role == ToolchainRole::Target {
            vars.push(("PKG_CONFIG_LIBDIR".to_string(), String::new()));
        }

        if let Some(ref sysroot) = self.sysroot {
            if self.role == ToolchainRole::Target {
                vars.push(("PKG_CONFIG_SYSROOT_DIR".to_string(), path_str(sysroot)));
            }
        }

        vars.extend(self.env_overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars
    }

    /// Variables addressed to this context by triple, for drivers (cargo,
    /// cc-rs, pkg-config-rs) that build for host and target in one process.
    pub fn triple_scoped_overrides(&self) -> Vec<(String, String)> {
        let suffix = self.platform.rust_triple.env_suffix();
        let mut vars = vec![
            (format!("CC_{}", suffix), path_str(&self.compilers.cc)),
            (format!("CXX_{}", suffix), path_str(&self.compilers.cxx)),
            (format!("AR_{}", suffix), path_str(&self.compilers.ar)),
        ];
        if !self.search_paths.is_empty() {
            vars.push((
                format!("PKG_CONFIG_PATH_{}", suffix),
                join_search_path(&self.pkgconfig_dirs()),
            ));
        }
        match self.role {
            ToolchainRole::Target => {
                vars.push((
                    format!("CARGO_TARGET_{}_LINKER", suffix.to_uppercase()),
                    path_str(&self.compilers.cc),
                ));
                if let Some(ref sysroot) = self.sysroot {
                    vars.push((format!("PKG_CONFIG_SYSROOT_DIR_{}", suffix), path_str(sysroot)));
                }
            }
            ToolchainRole::Host => {
                vars.push(("HOST_CC".to_string(), path_str(&self.compilers.cc)));
                vars.push(("HOST_CXX".to_string(), path_str(&self.compilers.cxx)));
            }
        }
        vars
    }

    /// Apply this context onto an environment until the guard is dropped.
    pub fn apply<'a>(&self, env: &'a mut Environment) -> EnvGuard<'a> {
        env.scoped(self.label(), self.environment_overrides())
    }
}

/// A command to execute, with program, arguments, and environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    /// The program to run (e.g., "cmake", "x86_64-w64-mingw32-gcc")
    pub program: PathBuf,
    /// Command arguments
    pub args: Vec<String>,
    /// Environment variables set on top of the step environment
    pub env: Vec<(String, String)>,
    /// Working directory
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Create a new command spec.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    /// Build a command from an argv list. Returns `None` for an empty list.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(CommandSpec::new(program).args(args.iter().cloned()))
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Display the command for logs and error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Separator of search-path variables on the build machine.
pub const SEARCH_PATH_SEP: &str = if cfg!(windows) { ";" } else { ":" };

/// Join directories with the platform's search-path separator.
pub fn join_search_path(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(SEARCH_PATH_SEP)
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}
