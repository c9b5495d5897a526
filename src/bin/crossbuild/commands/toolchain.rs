//! `crossbuild toolchain` command

use std::path::Path;

use anyhow::Result;

use super::{global_context, pipeline_error, Global, Project};
use crate::cli::ToolchainArgs;
use crossbuild::builder::toolchain::load_toolchain_config_from_files;
use crossbuild::core::manifest::DEFAULT_PLATFORM;
use crossbuild::util::process::find_executable;
use crossbuild::{resolve_contexts, ToolchainContext};

pub fn execute(args: ToolchainArgs, global: Global) -> Result<()> {
    // Works outside a project too; the manifest only supplies defaults
    let gctx = global_context(&args.project, global)?;
    let (platform, toolchain) = if args.project.manifest.is_some() || gctx.find_manifest().is_ok() {
        let project = Project::load(&args.project, global)?;
        (project.platform, project.toolchain)
    } else {
        let platform = args
            .project
            .platform
            .clone()
            .unwrap_or_else(|| DEFAULT_PLATFORM.to_string());
        (platform, load_toolchain_config_from_files(gctx.cwd()))
    };

    let contexts = resolve_contexts(&platform, false, &toolchain).map_err(pipeline_error)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&contexts)?);
        return Ok(());
    }

    show_context(&contexts.target);
    println!();
    show_context(&contexts.host);
    Ok(())
}

fn show_context(ctx: &ToolchainContext) {
    println!("{} ({})", ctx.label(), ctx.platform.id);
    println!("  rust:    {}", ctx.platform.rust_triple);
    tool("cc", &ctx.compilers.cc);
    tool("cxx", &ctx.compilers.cxx);
    tool("ar", &ctx.compilers.ar);
    tool("ranlib", &ctx.compilers.ranlib);
    tool("linker", &ctx.compilers.linker);
    tool("objdump", &ctx.objdump);
    if let Some(sysroot) = &ctx.sysroot {
        println!("  sysroot: {}", sysroot.display());
    }
    for (key, value) in &ctx.env_overrides {
        println!("  env:     {}={}", key, value);
    }
}

fn tool(name: &str, path: &Path) {
    let status = if find_executable(path).is_some() {
        ""
    } else {
        " (not found)"
    };
    println!("  {:<8} {}{}", format!("{}:", name), path.display(), status);
}
