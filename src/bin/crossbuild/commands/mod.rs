//! Command implementations

pub mod build;
pub mod cache;
pub mod plan;
pub mod toolchain;

use anyhow::{anyhow, Result};

use crate::cli::ProjectArgs;
use crossbuild::builder::toolchain::{load_toolchain_config_from_files, ResolvedContexts};
use crossbuild::util::config::ToolchainConfig;
use crossbuild::{resolve_contexts, GlobalContext, Manifest, PipelineError};

/// Flags accepted by every command.
#[derive(Debug, Clone, Copy)]
pub struct Global {
    pub verbose: bool,
    pub color: bool,
}

/// A loaded manifest with the settings that apply to it.
pub struct Project {
    pub gctx: GlobalContext,
    pub manifest: Manifest,
    /// Platform id after applying `--platform`
    pub platform: String,
    pub toolchain: ToolchainConfig,
}

impl Project {
    pub fn load(args: &ProjectArgs, global: Global) -> Result<Self> {
        let gctx = global_context(args, global)?;

        let manifest_path = match &args.manifest {
            Some(path) => gctx.cwd().join(path),
            None => gctx.find_manifest()?,
        };
        let manifest = Manifest::load(&manifest_path)?;
        tracing::debug!("Loaded manifest {}", manifest_path.display());

        let platform = args
            .platform
            .clone()
            .unwrap_or_else(|| manifest.pipeline.platform.clone());
        let toolchain = load_toolchain_config_from_files(&manifest.manifest_dir);

        Ok(Project {
            gctx,
            manifest,
            platform,
            toolchain,
        })
    }

    /// Resolve the toolchain contexts of a release build.
    pub fn contexts(&self) -> Result<ResolvedContexts> {
        resolve_contexts(&self.platform, false, &self.toolchain).map_err(pipeline_error)
    }
}

/// Turn a pipeline error into a command error, keeping its hints.
pub fn pipeline_error(err: PipelineError) -> anyhow::Error {
    if let PipelineError::UnsupportedPlatform { supported, .. } = &err {
        return anyhow!("{}\nsupported platforms: {}", err, supported);
    }
    err.into()
}

/// Build the global context, honoring `--cache-dir` and the global flags.
pub fn global_context(args: &ProjectArgs, global: Global) -> Result<GlobalContext> {
    let mut gctx = GlobalContext::new()?;
    gctx.set_verbose(global.verbose);
    gctx.set_color(global.color);
    if let Some(dir) = &args.cache_dir {
        let dir = gctx.cwd().join(dir);
        gctx.set_cache_root(dir);
    }
    Ok(gctx)
}
