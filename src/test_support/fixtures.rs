//! Test fixtures for common test scenarios.
//!
//! Contexts, steps and manifests shaped like the audio pipeline crossbuild
//! was written for: native libraries built for a MinGW target and for the
//! build machine, and applications packaged per platform.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::builder::toolchain::{resolve_contexts, ResolvedContexts, ToolchainContext};
use crate::core::manifest::Manifest;
use crate::core::step::{BuildStep, BuildSystem, FetchSpec};
use crate::util::config::ToolchainConfig;
use crate::util::context::{prefix_dir, work_dir};

/// Default contexts for the `windows` platform.
pub fn test_contexts() -> ResolvedContexts {
    contexts_for("windows")
}

/// Default contexts for a platform id.
pub fn contexts_for(platform: &str) -> ResolvedContexts {
    resolve_contexts(platform, false, &ToolchainConfig::default()).unwrap()
}

/// An autotools step installing `lib/lib<id>.a`, sourced from
/// `<cache>/upstream/<id>`.
pub fn autotools_step(cache_root: impl AsRef<Path>, ctx: &ToolchainContext, id: &str) -> BuildStep {
    let cache_root = cache_root.as_ref();
    let prefix = prefix_dir(cache_root, ctx.role, &ctx.platform.gnu_triple, id);
    BuildStep {
        id: id.to_string(),
        role: ctx.role,
        fetch: FetchSpec::Path {
            path: cache_root.join("upstream").join(id),
        },
        build_system: BuildSystem::Autotools,
        configure_args: Vec::new(),
        build_command: None,
        install_command: None,
        cache_marker: prefix.join("lib").join(format!("lib{}.a", id)),
        install_prefix: prefix,
        required: true,
        ldflags: Vec::new(),
        env: BTreeMap::new(),
        reuse_prefix: None,
        work_dir: work_dir(cache_root, ctx.role, &ctx.platform.gnu_triple, id),
    }
}

/// Create the local source directory a fixture step fetches from.
pub fn seed_source(step: &BuildStep) -> PathBuf {
    match &step.fetch {
        FetchSpec::Path { path } => {
            std::fs::create_dir_all(path).unwrap();
            std::fs::write(path.join("configure"), "#!/bin/sh\n").unwrap();
            path.clone()
        }
        other => panic!("fixture step fetches from {}", other.describe()),
    }
}

/// Manifest with a required target library, a required dual-context
/// library, an optional dual-context library and two applications.
pub const MESH_MANIFEST: &str = r#"
[pipeline]
name = "mesh"
platform = "windows"
jobs = 2
system-libraries = ["kernel32.dll", "msvcrt.dll"]

[[dependency]]
id = "fftw"
build-system = "autotools"
marker = "lib/libfftw3f.a"
configure-args = ["--enable-float", "--enable-shared"]
fetch = { path = "deps/fftw" }

[[dependency]]
id = "essentia"
contexts = ["target", "host"]
build-system = "waf"
marker = { target = "lib/libessentia.dll.a", host = "lib/libessentia.so" }
fetch = { path = "deps/essentia" }

[[dependency]]
id = "madmom"
contexts = ["target", "host"]
required = false
build-system = "custom"
marker = "lib/libmadmom.a"
fetch = { path = "deps/madmom" }

[dependency.custom]
configure = []
build = ["sh", "build.sh", "{prefix}"]
install = ["sh", "install.sh", "{prefix}"]

[[application]]
name = "mesh-player"
requires = ["fftw", "essentia"]
data-files = ["assets/*.wav"]
debug-features = ["console"]
cargo = { package = "mesh-player", features = ["essentia"] }

[[application]]
name = "mesh-cue"
contexts = ["target", "host"]
requires = ["essentia", "madmom"]
optional = true
cargo = { package = "mesh-cue" }
"#;

/// Parse [`MESH_MANIFEST`] as if it lived in `dir`.
pub fn mesh_manifest(dir: &Path) -> Manifest {
    Manifest::parse(MESH_MANIFEST, &dir.join("Crossbuild.toml")).unwrap()
}
