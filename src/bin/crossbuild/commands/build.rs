//! `crossbuild build` command

use anyhow::{bail, Result};

use super::{pipeline_error, Global, Project};
use crate::cli::{BuildArgs, MessageFormat};
use crossbuild::builder::{BuildContext, EventSink, Environment, SystemRunner};
use crossbuild::ops::AppStatus;
use crossbuild::util::diagnostic;
use crossbuild::{run_pipeline, PipelineOptions};

pub fn execute(args: BuildArgs, global: Global) -> Result<()> {
    let project = Project::load(&args.project, global)?;
    let json = args.message_format == MessageFormat::Json;

    let jobs = args
        .jobs
        .or(project.manifest.pipeline.jobs)
        .unwrap_or_else(|| project.gctx.default_jobs());

    let options = PipelineOptions {
        platform: Some(project.platform.clone()),
        debug: args.debug,
        output_dir: project.gctx.cwd().join(&args.output),
        toolchain: project.toolchain.clone(),
    };

    let events = if json {
        EventSink::stdout()
    } else {
        EventSink::silent()
    };

    let mut runner = SystemRunner::new();
    let mut bcx = BuildContext::new(
        &mut runner,
        Environment::capture(),
        project.gctx.cache_root(),
        jobs,
    )
    .with_progress(!project.gctx.is_verbose() && !json)
    .with_events(events);

    tracing::info!(
        "Building {} for {} ({} jobs)",
        project.manifest.pipeline.name,
        project.platform,
        jobs
    );

    let summary = run_pipeline(&project.manifest, &options, &mut bcx).map_err(pipeline_error)?;

    if let Some(err) = &summary.aborted {
        diagnostic::emit(&err.to_diagnostic(), project.gctx.color());
    }
    if !json {
        print!("{}", summary.render());
    }

    if !summary.success() {
        let failed: Vec<&str> = summary
            .applications
            .iter()
            .filter(|a| !a.optional && !matches!(a.status, AppStatus::Packaged { .. }))
            .map(|a| a.name.as_str())
            .collect();
        if failed.is_empty() {
            bail!("build aborted");
        }
        bail!("required application(s) not packaged: {}", failed.join(", "));
    }

    Ok(())
}
