//! Cache-checked execution of a single build step.

use crate::builder::context::BuildContext;
use crate::builder::env::Environment;
use crate::builder::errors::PipelineError;
use crate::builder::fingerprint::InstallRecord;
use crate::builder::native::NativeBuild;
use crate::builder::runner::{CommandOutput, CommandRunner};
use crate::builder::toolchain::{CommandSpec, ToolchainContext};
use crate::core::step::{BuildStep, StepState};
use crate::sources::fetch_source;

/// Result of running one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Marker present, nothing ran
    Skipped,
    /// Fetched, built and installed
    Installed,
}

impl StepOutcome {
    pub fn state(self) -> StepState {
        match self {
            StepOutcome::Skipped => StepState::Skipped,
            StepOutcome::Installed => StepState::Installed,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Configure,
    Build,
    Install,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Configure => "configure",
            Phase::Build => "build",
            Phase::Install => "install",
        }
    }
}

/// Runs build steps against the cache.
pub struct StepExecutor<'b, 'a> {
    bcx: &'b mut BuildContext<'a>,
}

impl<'b, 'a> StepExecutor<'b, 'a> {
    pub fn new(bcx: &'b mut BuildContext<'a>) -> Self {
        StepExecutor { bcx }
    }

    /// Run a step in a toolchain context.
    ///
    /// A step whose cache marker exists is skipped without fetching or
    /// running anything. Otherwise the context is applied for the duration
    /// of this call and sources are fetched, configured, built and
    /// installed. The base environment is restored on every return path.
    pub fn run(
        &mut self,
        step: &BuildStep,
        ctx: &ToolchainContext,
    ) -> Result<StepOutcome, PipelineError> {
        if step.is_cached() {
            tracing::info!(
                "Skipping {}: found {}",
                step.label(),
                step.cache_marker.display()
            );
            return Ok(StepOutcome::Skipped);
        }

        tracing::info!("Building {} for {}", step.id, ctx.label());

        let downloads = self.bcx.downloads_dir();
        let native = NativeBuild::new(step, ctx, self.bcx.jobs);

        let BuildContext { runner, env, .. } = &mut *self.bcx;
        let mut guard = ctx.apply(env);
        for (key, value) in native.step_env(&guard) {
            guard.set(key, value);
        }

        fetch_source(step, &downloads)
            .map_err(|e| PipelineError::fetch(&step.id, format!("{:#}", e)))?;

        let phases = [
            (Phase::Configure, native.configure_command()),
            (Phase::Build, native.build_command()),
            (Phase::Install, native.install_command()),
        ];
        for (phase, cmd) in phases {
            if let Some(cmd) = cmd {
                run_phase(&mut **runner, &guard, step, ctx, phase, &cmd)?;
            }
        }

        drop(guard);

        if !step.is_cached() {
            return Err(PipelineError::Install {
                step: step.id.clone(),
                marker: step.cache_marker.clone(),
            });
        }

        if let Err(e) = InstallRecord::new(step, ctx).save(&step.install_prefix) {
            tracing::warn!("Failed to write install record for {}: {:#}", step.label(), e);
        }

        tracing::info!("Installed {} into {}", step.label(), step.install_prefix.display());
        Ok(StepOutcome::Installed)
    }
}

fn run_phase(
    runner: &mut dyn CommandRunner,
    env: &Environment,
    step: &BuildStep,
    ctx: &ToolchainContext,
    phase: Phase,
    cmd: &CommandSpec,
) -> Result<(), PipelineError> {
    tracing::debug!("{} {}: {}", phase.name(), step.label(), cmd.display_command());

    let output = match runner.run(cmd, env) {
        Ok(output) => output,
        Err(e) => CommandOutput {
            status: None,
            stdout: String::new(),
            stderr: format!("failed to run `{}`: {:#}", cmd.display_command(), e),
        },
    };

    if output.success() {
        return Ok(());
    }

    let combined = output.combined();
    Err(match phase {
        Phase::Configure => PipelineError::configure(&step.id, &ctx.label(), &combined),
        Phase::Build => PipelineError::build(&step.id, &ctx.label(), &combined),
        Phase::Install => {
            PipelineError::build(&step.id, &format!("{}, install", ctx.label()), &combined)
        }
    })
}
