//! `crossbuild cache` command
//!
//! Inspect the install prefixes of dependency steps and invalidate them.

use anyhow::Result;

use super::{Global, Project};
use crate::cli::{CacheArgs, CacheCleanArgs, CacheCommands, CacheStatusArgs};
use crossbuild::ops::{cache_status, invalidate};

pub fn execute(args: CacheArgs, global: Global) -> Result<()> {
    match args.command {
        CacheCommands::Status(status_args) => show_status(status_args, global),
        CacheCommands::Clean(clean_args) => clean(clean_args, global),
    }
}

fn show_status(args: CacheStatusArgs, global: Global) -> Result<()> {
    let project = Project::load(&args.project, global)?;
    let contexts = project.contexts()?;
    let entries = cache_status(&project.manifest, &contexts, project.gctx.cache_root())?;

    println!("Cache directory: {}", project.gctx.cache_root().display());
    if entries.is_empty() {
        println!("  (no dependencies)");
        return Ok(());
    }

    let width = entries.iter().map(|e| e.id.len()).max().unwrap_or(0);
    for entry in &entries {
        let size = if entry.size > 0 {
            format!(" [{}]", format_size(entry.size))
        } else {
            String::new()
        };
        println!(
            "  {:<6}  {:<width$}  {}{}",
            entry.role.as_str(),
            entry.id,
            entry.state,
            size,
            width = width
        );
    }

    Ok(())
}

fn clean(args: CacheCleanArgs, global: Global) -> Result<()> {
    let project = Project::load(&args.project, global)?;
    let contexts = project.contexts()?;

    let removed = invalidate(
        &project.manifest,
        &contexts,
        project.gctx.cache_root(),
        &args.dependency,
        args.role,
    )?;

    if removed.is_empty() {
        eprintln!("     Nothing to invalidate for `{}`", args.dependency);
    }
    for marker in &removed {
        eprintln!("     Removed {}", marker.display());
    }

    Ok(())
}

/// Format a byte count as a human-readable size.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
