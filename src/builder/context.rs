//! Build context - the state shared by every stage of one invocation.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::builder::env::Environment;
use crate::builder::events::{BuildEvent, EventSink};
use crate::builder::runner::{CommandOutput, CommandRunner};
use crate::builder::toolchain::{CommandSpec, ToolchainContext};
use crate::util::context::{prefix_dir, work_dir};

/// Runner, base environment and cache layout of one pipeline invocation.
///
/// Toolchain contexts are never stored here; each stage applies the context
/// it needs onto `env` for the duration of a single call.
pub struct BuildContext<'a> {
    /// Subprocess seam
    pub runner: &'a mut dyn CommandRunner,

    /// Base environment handed to subprocesses
    pub env: Environment,

    /// Root of prefixes, work trees and downloads
    pub cache_root: PathBuf,

    /// Parallelism passed to build tools
    pub jobs: usize,

    /// Show progress bars
    pub progress: bool,

    /// Machine-readable events
    pub events: EventSink,
}

impl fmt::Debug for BuildContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("env", &self.env.len())
            .field("cache_root", &self.cache_root)
            .field("jobs", &self.jobs)
            .field("progress", &self.progress)
            .finish()
    }
}

impl<'a> BuildContext<'a> {
    pub fn new(
        runner: &'a mut dyn CommandRunner,
        env: Environment,
        cache_root: impl Into<PathBuf>,
        jobs: usize,
    ) -> Self {
        BuildContext {
            runner,
            env,
            cache_root: cache_root.into(),
            jobs: jobs.max(1),
            progress: false,
            events: EventSink::silent(),
        }
    }

    /// Enable progress bars.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Route events to a sink.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Checksum-keyed download cache.
    pub fn downloads_dir(&self) -> PathBuf {
        self.cache_root.join("downloads")
    }

    /// Install prefix of a dependency in a context.
    pub fn prefix_dir(&self, ctx: &ToolchainContext, id: &str) -> PathBuf {
        prefix_dir(&self.cache_root, ctx.role, &ctx.platform.gnu_triple, id)
    }

    /// Work directory of a dependency in a context.
    pub fn work_dir(&self, ctx: &ToolchainContext, id: &str) -> PathBuf {
        work_dir(&self.cache_root, ctx.role, &ctx.platform.gnu_triple, id)
    }

    /// Run a command with a toolchain context applied for this call only.
    pub fn run_in(
        &mut self,
        ctx: &ToolchainContext,
        extra: Vec<(String, String)>,
        cmd: &CommandSpec,
    ) -> Result<CommandOutput> {
        let mut guard = ctx.apply(&mut self.env);
        for (key, value) in extra {
            guard.set(key, value);
        }
        self.runner.run(cmd, &guard)
    }

    /// Run a command with the base environment.
    pub fn run(&mut self, cmd: &CommandSpec) -> Result<CommandOutput> {
        self.runner.run(cmd, &self.env)
    }

    pub fn emit(&mut self, event: BuildEvent) {
        self.events.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::toolchain::resolve_contexts;
    use crate::test_support::{CommandPattern, MockProcessOutput, MockRunner};
    use crate::util::config::ToolchainConfig;

    #[test]
    fn test_run_in_restores_environment() {
        let contexts = resolve_contexts("windows", false, &ToolchainConfig::default()).unwrap();
        let mut runner = MockRunner::new();
        runner.on(CommandPattern::Any, |call| {
            MockProcessOutput::success(call.var("CC").unwrap_or_default().to_string())
        });

        let env: Environment = [("CC", "cc"), ("PATH", "/usr/bin")].into_iter().collect();
        let before = env.clone();
        let mut bcx = BuildContext::new(&mut runner, env, "/cache", 4);

        let out = bcx
            .run_in(
                &contexts.target,
                vec![("LDFLAGS".to_string(), "-s".to_string())],
                &CommandSpec::new("make"),
            )
            .unwrap();
        assert_eq!(out.stdout, "x86_64-w64-mingw32-gcc-posix");
        assert_eq!(bcx.env, before);
    }

    #[test]
    fn test_layout() {
        let contexts = resolve_contexts("linux-aarch64", false, &ToolchainConfig::default()).unwrap();
        let mut runner = MockRunner::new();
        let bcx = BuildContext::new(&mut runner, Environment::empty(), "/cache", 0);

        assert_eq!(bcx.jobs, 1);
        assert_eq!(
            bcx.prefix_dir(&contexts.target, "fftw"),
            PathBuf::from("/cache/target-aarch64-linux-gnu/fftw")
        );
        assert_eq!(
            bcx.work_dir(&contexts.target, "fftw"),
            PathBuf::from("/cache/work/target-aarch64-linux-gnu/fftw")
        );
        assert_eq!(bcx.downloads_dir(), PathBuf::from("/cache/downloads"));
    }
}
