//! Crossbuild.toml manifest parsing and schema.
//!
//! The manifest declares the native dependencies to build, the applications
//! to produce and package, and pipeline-wide settings:
//!
//! ```toml
//! [pipeline]
//! name = "mesh"
//! platform = "windows"
//!
//! [[dependency]]
//! id = "essentia"
//! contexts = ["target", "host"]
//! build-system = "waf"
//! marker = { target = "lib/libessentia.dll.a", host = "lib/libessentia.so" }
//! fetch = { git = "https://github.com/MTG/essentia.git", rev = "v2.1_beta5" }
//!
//! [[application]]
//! name = "mesh-cue"
//! contexts = ["target", "host"]
//! requires = ["essentia"]
//! optional = true
//! cargo = { package = "mesh-cue" }
//! ```
//!
//! Relative paths are resolved against the manifest's directory.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::builder::errors::PipelineError;
use crate::builder::toolchain::ToolchainRole;
use crate::core::application::{AppDriver, Application};
use crate::core::step::{BuildSystem, CustomCommands, FetchSpec};

/// Canonical manifest file name.
pub const MANIFEST_NAME: &str = "Crossbuild.toml";

/// Platform built when neither the manifest nor the command line names one.
pub const DEFAULT_PLATFORM: &str = "windows";

/// Pipeline-wide settings from `[pipeline]`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSettings {
    /// Project name used in logs
    pub name: String,
    /// Default target platform id
    pub platform: String,
    /// Parallel jobs passed to build systems
    pub jobs: Option<usize>,
    /// Directories searched for runtime libraries not found in any prefix
    pub runtime_search_dirs: Vec<PathBuf>,
    /// Libraries provided by the target OS, never shipped
    pub system_libraries: Vec<String>,
}

/// A native dependency declaration from `[[dependency]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencySpec {
    pub id: String,
    /// Contexts the dependency is built in
    pub contexts: Vec<ToolchainRole>,
    pub required: bool,
    pub build_system: BuildSystem,
    pub fetch: FetchSpec,
    pub configure_args: Vec<String>,
    pub build_command: Option<Vec<String>>,
    pub install_command: Option<Vec<String>>,
    /// Marker path relative to the install prefix
    pub marker: PathBuf,
    /// Host marker when it differs from `marker` (import library vs. ELF
    /// shared object)
    pub host_marker: Option<PathBuf>,
    pub ldflags: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl DependencySpec {
    /// Whether the dependency is built in a context.
    pub fn builds_in(&self, role: ToolchainRole) -> bool {
        self.contexts.contains(&role)
    }

    /// Marker of the install in a context, relative to its prefix.
    pub fn marker_for(&self, role: ToolchainRole) -> &Path {
        match (role, &self.host_marker) {
            (ToolchainRole::Host, Some(host)) => host,
            _ => &self.marker,
        }
    }
}

/// The parsed Crossbuild.toml manifest.
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub pipeline: PipelineSettings,
    /// Dependencies in build order
    pub dependencies: Vec<DependencySpec>,
    /// Applications in build order
    pub applications: Vec<Application>,
    /// Directory containing the manifest
    pub manifest_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default)]
    pipeline: RawPipeline,
    #[serde(default)]
    dependency: Vec<RawDependency>,
    #[serde(default)]
    application: Vec<RawApplication>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawPipeline {
    name: Option<String>,
    platform: Option<String>,
    jobs: Option<usize>,
    #[serde(default)]
    runtime_search_dirs: Vec<PathBuf>,
    #[serde(default)]
    system_libraries: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawDependency {
    id: String,
    #[serde(default)]
    contexts: Option<Vec<ToolchainRole>>,
    #[serde(default = "default_true")]
    required: bool,
    build_system: String,
    fetch: RawFetch,
    marker: RawMarker,
    #[serde(default)]
    configure_args: Vec<String>,
    build_command: Option<Vec<String>>,
    install_command: Option<Vec<String>>,
    #[serde(default)]
    ldflags: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    custom: Option<CustomCommands>,
}

/// `marker = "lib/x.a"` or `marker = { target = "...", host = "..." }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMarker {
    Shared(PathBuf),
    PerContext { target: PathBuf, host: PathBuf },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawFetch {
    url: Option<String>,
    sha256: Option<String>,
    strip_prefix: Option<String>,
    git: Option<String>,
    rev: Option<String>,
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawApplication {
    name: String,
    source: Option<PathBuf>,
    #[serde(default)]
    contexts: Option<Vec<ToolchainRole>>,
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    optional: bool,
    binary: Option<String>,
    output: Option<PathBuf>,
    #[serde(default)]
    data_files: Vec<String>,
    #[serde(default)]
    debug_features: Vec<String>,
    cargo: Option<RawCargo>,
    cc: Option<RawCc>,
    command: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawCargo {
    package: Option<String>,
    #[serde(default)]
    features: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawCc {
    sources: Vec<PathBuf>,
    #[serde(default)]
    libs: Vec<String>,
    #[serde(default)]
    cflags: Vec<String>,
    #[serde(default)]
    ldflags: Vec<String>,
    #[serde(default)]
    cxx: bool,
}

fn default_true() -> bool {
    true
}

impl Manifest {
    /// Load a manifest from a file path.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::manifest(format!("failed to read {}: {}", path.display(), e))
        })?;

        Self::parse(&content, path)
    }

    /// Parse and validate manifest content.
    pub fn parse(content: &str, path: &Path) -> Result<Self, PipelineError> {
        let raw: RawManifest = toml::from_str(content).map_err(|e| {
            PipelineError::manifest(format!("failed to parse {}: {}", path.display(), e))
        })?;

        let manifest_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();

        let name = raw.pipeline.name.unwrap_or_else(|| {
            manifest_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "crossbuild".to_string())
        });

        let pipeline = PipelineSettings {
            name,
            platform: raw
                .pipeline
                .platform
                .unwrap_or_else(|| DEFAULT_PLATFORM.to_string()),
            jobs: raw.pipeline.jobs,
            runtime_search_dirs: raw
                .pipeline
                .runtime_search_dirs
                .into_iter()
                .map(|d| manifest_dir.join(d))
                .collect(),
            system_libraries: raw.pipeline.system_libraries,
        };

        let dependencies = raw
            .dependency
            .into_iter()
            .map(|d| convert_dependency(d, &manifest_dir))
            .collect::<Result<Vec<_>, _>>()?;

        let applications = raw
            .application
            .into_iter()
            .map(|a| convert_application(a, &manifest_dir))
            .collect::<Result<Vec<_>, _>>()?;

        let manifest = Manifest {
            pipeline,
            dependencies,
            applications,
            manifest_dir,
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check cross-references between declarations.
    fn validate(&self) -> Result<(), PipelineError> {
        let mut ids = HashSet::new();
        for dep in &self.dependencies {
            if !ids.insert(dep.id.as_str()) {
                return Err(PipelineError::manifest(format!(
                    "dependency `{}` is declared twice",
                    dep.id
                )));
            }
        }

        let mut names = HashSet::new();
        for app in &self.applications {
            if !names.insert(app.name.as_str()) {
                return Err(PipelineError::manifest(format!(
                    "application `{}` is declared twice",
                    app.name
                )));
            }

            for lib in &app.required_libraries {
                let Some(dep) = self.dependency(lib) else {
                    return Err(PipelineError::manifest(format!(
                        "application `{}` requires unknown dependency `{}`",
                        app.name, lib
                    )));
                };
                for role in &app.contexts {
                    if !dep.builds_in(*role) {
                        return Err(PipelineError::manifest(format!(
                            "application `{}` needs `{}` in the {} context, but it is only built for {}",
                            app.name,
                            lib,
                            role,
                            join_roles(&dep.contexts)
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Find a dependency by id.
    pub fn dependency(&self, id: &str) -> Option<&DependencySpec> {
        self.dependencies.iter().find(|d| d.id == id)
    }

    /// Find an application by name.
    pub fn application(&self, name: &str) -> Option<&Application> {
        self.applications.iter().find(|a| a.name == name)
    }
}

fn join_roles(roles: &[ToolchainRole]) -> String {
    roles
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(" and ")
}

fn check_contexts(owner: &str, contexts: &[ToolchainRole]) -> Result<(), PipelineError> {
    if contexts.is_empty() {
        return Err(PipelineError::manifest(format!(
            "`{}` must list at least one context",
            owner
        )));
    }
    let unique: HashSet<_> = contexts.iter().collect();
    if unique.len() != contexts.len() {
        return Err(PipelineError::manifest(format!(
            "`{}` lists a context twice",
            owner
        )));
    }
    Ok(())
}

fn convert_fetch(id: &str, raw: RawFetch, manifest_dir: &Path) -> Result<FetchSpec, PipelineError> {
    match (raw.url, raw.git, raw.path) {
        (Some(url), None, None) => {
            let sha256 = raw.sha256.ok_or_else(|| {
                PipelineError::manifest(format!("dependency `{}`: url fetch needs `sha256`", id))
            })?;
            url::Url::parse(&url).map_err(|e| {
                PipelineError::manifest(format!("dependency `{}`: invalid url `{}`: {}", id, url, e))
            })?;
            Ok(FetchSpec::Url {
                url,
                sha256: sha256.to_lowercase(),
                strip_prefix: raw.strip_prefix,
            })
        }
        (None, Some(url), None) => Ok(FetchSpec::Git { url, rev: raw.rev }),
        (None, None, Some(path)) => Ok(FetchSpec::Path {
            path: manifest_dir.join(path),
        }),
        _ => Err(PipelineError::manifest(format!(
            "dependency `{}`: fetch needs exactly one of `url`, `git` or `path`",
            id
        ))),
    }
}

fn convert_dependency(raw: RawDependency, manifest_dir: &Path) -> Result<DependencySpec, PipelineError> {
    let contexts = raw.contexts.unwrap_or_else(|| vec![ToolchainRole::Target]);
    check_contexts(&raw.id, &contexts)?;

    let build_system = match (raw.build_system.as_str(), raw.custom) {
        ("custom", Some(custom)) => BuildSystem::Custom(custom),
        ("custom", None) => {
            return Err(PipelineError::manifest(format!(
                "dependency `{}`: build-system = \"custom\" needs a [dependency.custom] table",
                raw.id
            )))
        }
        (name, None) => BuildSystem::from_name(name).ok_or_else(|| {
            PipelineError::manifest(format!(
                "dependency `{}`: unknown build system `{}` (expected cmake, autotools, waf or custom)",
                raw.id, name
            ))
        })?,
        (name, Some(_)) => {
            return Err(PipelineError::manifest(format!(
                "dependency `{}`: [dependency.custom] given but build-system is `{}`",
                raw.id, name
            )))
        }
    };

    let (marker, host_marker) = match raw.marker {
        RawMarker::Shared(path) => (path, None),
        RawMarker::PerContext { target, host } => (target, Some(host)),
    };
    if marker.is_absolute() || host_marker.as_ref().is_some_and(|m| m.is_absolute()) {
        return Err(PipelineError::manifest(format!(
            "dependency `{}`: marker must be relative to the install prefix",
            raw.id
        )));
    }

    let fetch = convert_fetch(&raw.id, raw.fetch, manifest_dir)?;

    Ok(DependencySpec {
        id: raw.id,
        contexts,
        required: raw.required,
        build_system,
        fetch,
        configure_args: raw.configure_args,
        build_command: raw.build_command,
        install_command: raw.install_command,
        marker,
        host_marker,
        ldflags: raw.ldflags,
        env: raw.env,
    })
}

fn convert_application(raw: RawApplication, manifest_dir: &Path) -> Result<Application, PipelineError> {
    let contexts = raw.contexts.unwrap_or_else(|| vec![ToolchainRole::Target]);
    check_contexts(&raw.name, &contexts)?;

    let driver = match (raw.cargo, raw.cc, raw.command) {
        (Some(cargo), None, None) => AppDriver::Cargo {
            package: cargo.package,
            features: cargo.features,
        },
        (None, Some(cc), None) => AppDriver::Cc {
            sources: cc.sources,
            libs: cc.libs,
            cflags: cc.cflags,
            ldflags: cc.ldflags,
            cxx: cc.cxx,
        },
        (None, None, Some(argv)) => {
            if argv.is_empty() {
                return Err(PipelineError::manifest(format!(
                    "application `{}`: command must not be empty",
                    raw.name
                )));
            }
            if raw.output.is_none() {
                return Err(PipelineError::manifest(format!(
                    "application `{}`: a command driver needs `output`",
                    raw.name
                )));
            }
            AppDriver::Command { argv }
        }
        _ => {
            return Err(PipelineError::manifest(format!(
                "application `{}` needs exactly one of `cargo`, `cc` or `command`",
                raw.name
            )))
        }
    };

    let source_unit = match raw.source {
        Some(source) => manifest_dir.join(source),
        None => manifest_dir.to_path_buf(),
    };

    Ok(Application {
        binary: raw.binary.unwrap_or_else(|| raw.name.clone()),
        name: raw.name,
        source_unit,
        contexts,
        required_libraries: raw.requires,
        optional: raw.optional,
        output: raw.output,
        driver,
        debug_features: raw.debug_features,
        data_files: raw.data_files,
    })
}

/// Find the manifest in a directory.
pub fn find_manifest(dir: &Path) -> Option<PathBuf> {
    let path = dir.join(MANIFEST_NAME);
    path.is_file().then_some(path)
}
