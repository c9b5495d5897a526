//! `crossbuild plan` command
//!
//! Prints what `crossbuild build` would do without running anything.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use super::{Global, Project};
use crate::cli::PlanArgs;
use crossbuild::core::StepState;
use crossbuild::ops::planned_steps;
use crossbuild::ToolchainRole;

#[derive(Serialize)]
struct Plan<'a> {
    pipeline: &'a str,
    platform: &'a str,
    target_triple: &'a str,
    steps: Vec<PlannedStep>,
    applications: Vec<PlannedApp<'a>>,
}

#[derive(Serialize)]
struct PlannedStep {
    id: String,
    context: ToolchainRole,
    prefix: PathBuf,
    cached: bool,
}

#[derive(Serialize)]
struct PlannedApp<'a> {
    name: &'a str,
    driver: &'static str,
    contexts: &'a [ToolchainRole],
    requires: &'a [String],
    optional: bool,
}

pub fn execute(args: PlanArgs, global: Global) -> Result<()> {
    let project = Project::load(&args.project, global)?;
    let contexts = project.contexts()?;
    let manifest = &project.manifest;

    let plan = Plan {
        pipeline: &manifest.pipeline.name,
        platform: &project.platform,
        target_triple: &contexts.target.platform.gnu_triple,
        steps: planned_steps(manifest, &contexts, project.gctx.cache_root())
            .into_iter()
            .map(|report| PlannedStep {
                cached: report.state == StepState::Skipped,
                id: report.id,
                context: report.role,
                prefix: report.prefix,
            })
            .collect(),
        applications: manifest
            .applications
            .iter()
            .map(|app| PlannedApp {
                name: &app.name,
                driver: app.driver.name(),
                contexts: &app.contexts,
                requires: &app.required_libraries,
                optional: app.optional,
            })
            .collect(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!(
        "Plan for {} ({}, {})",
        plan.pipeline, plan.platform, plan.target_triple
    );

    println!("Dependencies:");
    if plan.steps.is_empty() {
        println!("  (none)");
    }
    let width = plan.steps.iter().map(|s| s.id.len()).max().unwrap_or(0);
    for step in &plan.steps {
        println!(
            "  {:<6}  {:<width$}  {:<7}  {}",
            step.context.as_str(),
            step.id,
            if step.cached { "cached" } else { "build" },
            step.prefix.display(),
            width = width
        );
    }

    println!("Applications:");
    if plan.applications.is_empty() {
        println!("  (none)");
    }
    for app in &plan.applications {
        let contexts: Vec<&str> = app.contexts.iter().map(|r| r.as_str()).collect();
        let mut line = format!("  {} ({}, {})", app.name, app.driver, contexts.join("+"));
        if !app.requires.is_empty() {
            line.push_str(&format!(" requires {}", app.requires.join(", ")));
        }
        if app.optional {
            line.push_str(" [optional]");
        }
        println!("{}", line);
    }

    Ok(())
}
