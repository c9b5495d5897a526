//! Dual-context native library builds.
//!
//! One dependency declaration yields up to two build steps: one for the
//! target platform and one for the build machine. Each installs into its own
//! prefix, and the two never share compilers or environment.

use std::path::PathBuf;

use crate::builder::context::BuildContext;
use crate::builder::errors::PipelineError;
use crate::builder::executor::{StepExecutor, StepOutcome};
use crate::builder::toolchain::{ResolvedContexts, ToolchainContext, ToolchainRole};
use crate::core::manifest::DependencySpec;
use crate::core::step::{BuildStep, BuildSystem, DependencyGraph};
use crate::util::context::{prefix_dir, work_dir};

/// Linker flag exporting every symbol of a MinGW shared library.
pub const EXPORT_ALL_SYMBOLS_FLAG: &str = "-Wl,--export-all-symbols";

/// CMake switch with the same effect for CMake-driven libraries.
pub const CMAKE_EXPORT_ALL_SYMBOLS: &str = "-DCMAKE_WINDOWS_EXPORT_ALL_SYMBOLS=ON";

/// Outcomes of building both halves of a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DualOutcome {
    pub target: Option<StepOutcome>,
    pub host: Option<StepOutcome>,
}

/// Derives per-context build steps from dependency declarations.
pub struct DualContextBuilder<'c> {
    contexts: &'c ResolvedContexts,
    cache_root: PathBuf,
}

impl<'c> DualContextBuilder<'c> {
    pub fn new(contexts: &'c ResolvedContexts, cache_root: impl Into<PathBuf>) -> Self {
        DualContextBuilder {
            contexts,
            cache_root: cache_root.into(),
        }
    }

    /// Install prefix of a dependency in a context.
    pub fn prefix(&self, role: ToolchainRole, id: &str) -> PathBuf {
        let ctx = self.contexts.get(role);
        prefix_dir(&self.cache_root, role, &ctx.platform.gnu_triple, id)
    }

    /// Step building a dependency in a context.
    pub fn step(&self, dep: &DependencySpec, role: ToolchainRole) -> BuildStep {
        match role {
            ToolchainRole::Target => self.target_step(dep),
            ToolchainRole::Host => self.host_step(dep),
        }
    }

    /// Target half.
    ///
    /// Platforms that hide symbols by default get every symbol exported so
    /// applications can link against the library's full interface.
    pub fn target_step(&self, dep: &DependencySpec) -> BuildStep {
        let ctx = &self.contexts.target;
        let mut step = self.base_step(dep, ctx);

        if ctx.platform.needs_export_all_symbols() {
            if !step.ldflags.iter().any(|f| f == EXPORT_ALL_SYMBOLS_FLAG) {
                step.ldflags.push(EXPORT_ALL_SYMBOLS_FLAG.to_string());
            }
            if step.build_system == BuildSystem::CMake {
                step.configure_args.push(CMAKE_EXPORT_ALL_SYMBOLS.to_string());
            }
        }

        step
    }

    /// Host half.
    ///
    /// When the dependency is also built for the target, the target prefix
    /// is offered for header reuse at the lowest include precedence.
    pub fn host_step(&self, dep: &DependencySpec) -> BuildStep {
        let ctx = &self.contexts.host;
        let mut step = self.base_step(dep, ctx);
        if dep.builds_in(ToolchainRole::Target) {
            step.reuse_prefix = Some(self.prefix(ToolchainRole::Target, &dep.id));
        }
        step
    }

    /// Steps of every dependency built in a context, in declaration order.
    pub fn graph(&self, deps: &[DependencySpec], role: ToolchainRole) -> DependencyGraph {
        let steps = deps
            .iter()
            .filter(|d| d.builds_in(role))
            .map(|d| self.step(d, role))
            .collect();
        DependencyGraph::new(role, steps)
    }

    /// A context whose search paths cover the prefixes of the given
    /// dependencies in that context.
    pub fn search_context<'d>(
        &self,
        role: ToolchainRole,
        ids: impl IntoIterator<Item = &'d str>,
    ) -> ToolchainContext {
        let prefixes: Vec<PathBuf> = ids.into_iter().map(|id| self.prefix(role, id)).collect();
        self.contexts.get(role).with_search_paths(prefixes)
    }

    /// Build both halves back to back, target first.
    pub fn build(
        &self,
        bcx: &mut BuildContext<'_>,
        dep: &DependencySpec,
    ) -> Result<DualOutcome, PipelineError> {
        let mut outcome = DualOutcome {
            target: None,
            host: None,
        };

        if dep.builds_in(ToolchainRole::Target) {
            let step = self.target_step(dep);
            outcome.target = Some(StepExecutor::new(&mut *bcx).run(&step, &self.contexts.target)?);
        }
        if dep.builds_in(ToolchainRole::Host) {
            let step = self.host_step(dep);
            outcome.host = Some(StepExecutor::new(&mut *bcx).run(&step, &self.contexts.host)?);
        }

        Ok(outcome)
    }

    fn base_step(&self, dep: &DependencySpec, ctx: &ToolchainContext) -> BuildStep {
        let prefix = self.prefix(ctx.role, &dep.id);
        BuildStep {
            id: dep.id.clone(),
            role: ctx.role,
            fetch: dep.fetch.clone(),
            build_system: dep.build_system.clone(),
            configure_args: dep.configure_args.clone(),
            build_command: dep.build_command.clone(),
            install_command: dep.install_command.clone(),
            cache_marker: prefix.join(dep.marker_for(ctx.role)),
            install_prefix: prefix,
            required: dep.required,
            ldflags: dep.ldflags.clone(),
            env: dep.env.clone(),
            reuse_prefix: None,
            work_dir: work_dir(&self.cache_root, ctx.role, &ctx.platform.gnu_triple, &dep.id),
        }
    }
}
