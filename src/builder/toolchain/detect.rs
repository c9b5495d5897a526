//! Toolchain context resolution.

use std::path::PathBuf;

use serde::Serialize;

use crate::builder::errors::PipelineError;
use crate::core::platform::{TargetPlatform, SUPPORTED_PLATFORMS};
use crate::util::config::{
    global_toolchain_config_path, load_toolchain_config, project_toolchain_config_path,
    RoleToolchain, ToolchainConfig,
};

use super::{GccTools, ToolchainContext, ToolchainRole};

/// The host and target contexts of one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedContexts {
    pub host: ToolchainContext,
    pub target: ToolchainContext,
}

impl ResolvedContexts {
    /// Context for a role.
    pub fn get(&self, role: ToolchainRole) -> &ToolchainContext {
        match role {
            ToolchainRole::Host => &self.host,
            ToolchainRole::Target => &self.target,
        }
    }
}

/// Build the host and target contexts for a platform.
///
/// Construction is pure: no tool is executed and nothing in the process
/// environment is read or written. The target context uses the GNU cross
/// tools named after the platform triple, the host context the native
/// tools; per-role overrides from `config` replace individual entries.
pub fn resolve_contexts(
    platform_id: &str,
    debug: bool,
    config: &ToolchainConfig,
) -> Result<ResolvedContexts, PipelineError> {
    let platform =
        TargetPlatform::lookup(platform_id).ok_or_else(|| PipelineError::UnsupportedPlatform {
            platform: platform_id.to_string(),
            supported: SUPPORTED_PLATFORMS.join(", "),
        })?;

    let target_tools = GccTools::cross(&platform.gnu_triple, platform.posix_threads_suffix);
    let target = build_context(
        ToolchainRole::Target,
        platform,
        &target_tools,
        config.role(ToolchainRole::Target),
        debug,
    );

    let host = build_context(
        ToolchainRole::Host,
        TargetPlatform::host(),
        &GccTools::native(),
        config.role(ToolchainRole::Host),
        debug,
    );

    tracing::debug!(
        "Resolved contexts: target cc={}, host cc={}",
        target.compilers.cc.display(),
        host.compilers.cc.display()
    );

    Ok(ResolvedContexts { host, target })
}

fn build_context(
    role: ToolchainRole,
    platform: TargetPlatform,
    tools: &GccTools,
    overrides: &RoleToolchain,
    debug: bool,
) -> ToolchainContext {
    let mut compilers = tools.compiler_paths();
    let mut objdump = tools.objdump();

    if let Some(ref cc) = overrides.cc {
        compilers.cc = cc.clone();
        // A configured C compiler without a C++ one implies its sibling
        compilers.cxx = GccTools::infer_cxx(cc);
    }
    if let Some(ref cxx) = overrides.cxx {
        compilers.cxx = cxx.clone();
    }
    if let Some(ref ar) = overrides.ar {
        compilers.ar = ar.clone();
    }
    if let Some(ref ranlib) = overrides.ranlib {
        compilers.ranlib = ranlib.clone();
    }
    if let Some(ref linker) = overrides.linker {
        compilers.linker = linker.clone();
    }
    if let Some(ref o) = overrides.objdump {
        objdump = o.clone();
    }

    if overrides.has_overrides() {
        tracing::info!("Using {} toolchain overrides from config", role);
    }

    ToolchainContext {
        role,
        platform,
        compilers,
        objdump,
        sysroot: overrides.sysroot.clone(),
        search_paths: Vec::new(),
        env_overrides: overrides.env.clone(),
        debug,
    }
}

/// Load toolchain configuration from the project and global config files.
pub fn load_toolchain_config_from_files(project_root: &std::path::Path) -> ToolchainConfig {
    let project_path = project_toolchain_config_path(project_root);
    let global_path: Option<PathBuf> = global_toolchain_config_path();
    load_toolchain_config(global_path.as_deref(), &project_path)
}
