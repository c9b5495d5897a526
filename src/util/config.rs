//! User and project configuration files.
//!
//! Two files are read from two places each, the project copy winning:
//!
//! | file             | global                   | project                   |
//! |------------------|--------------------------|---------------------------|
//! | `config.toml`    | `~/.crossbuild/`         | `<project>/.crossbuild/`  |
//! | `toolchain.toml` | `~/.crossbuild/`         | `<project>/.crossbuild/`  |
//!
//! A missing file is the same as an empty one. A file that fails to parse is
//! reported with a warning and ignored.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::builder::toolchain::ToolchainRole;

const CONFIG_DIR: &str = ".crossbuild";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub build: BuildConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuildConfig {
    /// Parallel jobs handed to make, waf and cargo
    pub jobs: Option<usize>,

    /// Cache root used when neither `--cache-dir` nor the environment sets one
    pub cache_dir: Option<PathBuf>,
}

impl Config {
    fn overlay(&mut self, other: Config) {
        self.build.jobs = other.build.jobs.or(self.build.jobs);
        self.build.cache_dir = other.build.cache_dir.or(self.build.cache_dir.take());
    }
}

/// Tool overrides for the host and target contexts, kept apart from
/// `config.toml` so switching cross toolchains touches one small file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub host: RoleToolchain,
    pub target: RoleToolchain,
}

/// Replacement tool paths for one role. Unset entries keep the detected tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleToolchain {
    /// e.g. `/opt/mingw/bin/x86_64-w64-mingw32-gcc`
    pub cc: Option<PathBuf>,
    /// Derived from `cc` when only that is set
    pub cxx: Option<PathBuf>,
    pub ar: Option<PathBuf>,
    pub ranlib: Option<PathBuf>,
    pub linker: Option<PathBuf>,
    pub objdump: Option<PathBuf>,
    pub sysroot: Option<PathBuf>,
    /// Extra variables for every step run in this role
    pub env: BTreeMap<String, String>,
}

impl RoleToolchain {
    pub fn has_overrides(&self) -> bool {
        let tools = [
            &self.cc,
            &self.cxx,
            &self.ar,
            &self.ranlib,
            &self.linker,
            &self.objdump,
            &self.sysroot,
        ];
        tools.iter().any(|t| t.is_some()) || !self.env.is_empty()
    }

    /// Overlay `other`; its set entries win and env tables merge per key.
    fn overlay(&mut self, other: RoleToolchain) {
        let pairs = [
            (&mut self.cc, other.cc),
            (&mut self.cxx, other.cxx),
            (&mut self.ar, other.ar),
            (&mut self.ranlib, other.ranlib),
            (&mut self.linker, other.linker),
            (&mut self.objdump, other.objdump),
            (&mut self.sysroot, other.sysroot),
        ];
        for (slot, value) in pairs {
            if value.is_some() {
                *slot = value;
            }
        }
        self.env.extend(other.env);
    }
}

impl ToolchainConfig {
    pub fn load(path: &Path) -> Result<Self> {
        read_toml(path)
    }

    pub fn role(&self, role: ToolchainRole) -> &RoleToolchain {
        match role {
            ToolchainRole::Host => &self.host,
            ToolchainRole::Target => &self.target,
        }
    }

    pub fn has_overrides(&self) -> bool {
        self.host.has_overrides() || self.target.has_overrides()
    }

    fn overlay(&mut self, other: ToolchainConfig) {
        self.host.overlay(other.host);
        self.target.overlay(other.target);
    }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid TOML in {}", path.display()))
}

fn read_optional<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.is_file() {
        return T::default();
    }
    match read_toml(path) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("ignoring {}: {:#}", path.display(), e);
            T::default()
        }
    }
}

/// Toolchain overrides with the project file layered over the global one.
pub fn load_toolchain_config(global_path: Option<&Path>, project_path: &Path) -> ToolchainConfig {
    let mut config: ToolchainConfig = global_path.map(read_optional).unwrap_or_default();
    config.overlay(read_optional(project_path));
    config
}

/// Settings with the project file layered over the global one.
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config: Config = global_path.map(read_optional).unwrap_or_default();
    config.overlay(read_optional(project_path));
    config
}

/// `~/.crossbuild`
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(CONFIG_DIR))
}

pub fn global_toolchain_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("toolchain.toml"))
}

pub fn project_toolchain_config_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_DIR).join("toolchain.toml")
}

pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_DIR).join("config.toml")
}
