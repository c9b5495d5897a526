//! Ordered execution of a context's dependency steps.

use std::path::PathBuf;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

use crate::builder::context::BuildContext;
use crate::builder::errors::PipelineError;
use crate::builder::events::BuildEvent;
use crate::builder::executor::StepExecutor;
use crate::builder::toolchain::{ToolchainContext, ToolchainRole};
use crate::core::step::{BuildStep, DependencyGraph, StepState};

/// Final state of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub id: String,
    pub role: ToolchainRole,
    pub prefix: PathBuf,
    pub state: StepState,
}

impl StepReport {
    fn new(step: &BuildStep, state: StepState) -> Self {
        StepReport {
            id: step.id.clone(),
            role: step.role,
            prefix: step.install_prefix.clone(),
            state,
        }
    }

    /// Whether the step's prefix can be linked against.
    pub fn is_available(&self) -> bool {
        matches!(self.state, StepState::Skipped | StepState::Installed)
    }
}

/// Executes a [`DependencyGraph`] step by step.
pub struct GraphExecutor<'b, 'a> {
    bcx: &'b mut BuildContext<'a>,
}

impl<'b, 'a> GraphExecutor<'b, 'a> {
    pub fn new(bcx: &'b mut BuildContext<'a>) -> Self {
        GraphExecutor { bcx }
    }

    /// Run every step in list order.
    ///
    /// List order is dependency order: each step searches the prefixes of
    /// the available steps before it for headers, libraries and pkg-config
    /// files. A failed optional step's prefix is not searched.
    ///
    /// A failing required step aborts the graph and its error is returned.
    /// A failing optional step is reported as `Failed` and the remaining
    /// steps still run.
    pub fn execute(
        &mut self,
        graph: &DependencyGraph,
        ctx: &ToolchainContext,
    ) -> Result<Vec<StepReport>, PipelineError> {
        let start = Instant::now();
        let total = graph.steps.len();

        let pb = if self.bcx.progress && total > 1 {
            let pb = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            Some(pb)
        } else {
            None
        };

        let mut reports = Vec::with_capacity(total);
        let mut installed: Vec<PathBuf> = Vec::new();
        for step in &graph.steps {
            if let Some(ref pb) = pb {
                pb.set_message(step.label());
            }

            let step_ctx = ctx.with_search_paths(installed.iter().cloned());
            let result = StepExecutor::new(&mut *self.bcx).run(step, &step_ctx);
            let report = match result {
                Ok(outcome) => StepReport::new(step, outcome.state()),
                Err(err) if step.required => {
                    self.emit(step, &StepState::Failed(err.to_string()));
                    if let Some(pb) = pb {
                        pb.abandon_with_message(format!("{} failed", step.label()));
                    }
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!("Optional dependency {} failed: {}", step.label(), err);
                    if let Some(tail) = err.tail().filter(|t| !t.is_empty()) {
                        tracing::debug!("{}", tail);
                    }
                    StepReport::new(step, StepState::Failed(err.to_string()))
                }
            };

            self.emit(step, &report.state);
            if report.is_available() {
                installed.push(report.prefix.clone());
            }
            reports.push(report);

            if let Some(ref pb) = pb {
                pb.inc(1);
            }
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        tracing::info!(
            "Finished {} {} step(s) in {:.2}s",
            total,
            graph.context,
            start.elapsed().as_secs_f64()
        );

        Ok(reports)
    }

    fn emit(&mut self, step: &BuildStep, state: &StepState) {
        let (name, message) = match state {
            StepState::Failed(reason) => ("failed", Some(reason.clone())),
            StepState::Skipped => ("cached", None),
            StepState::Installed => ("installed", None),
            StepState::Pending => ("pending", None),
            StepState::Building => ("building", None),
        };
        self.bcx.emit(BuildEvent::StepFinished {
            step: step.id.clone(),
            context: step.role.to_string(),
            state: name.to_string(),
            message,
            prefix: step.install_prefix.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::env::Environment;
    use crate::builder::events::EventSink;
    use crate::test_support::{
        autotools_step, seed_source, test_contexts, touch, touching, CommandPattern,
        MockProcessOutput, MockRunner,
    };
    use tempfile::TempDir;

    fn graph(tmp: &TempDir, ctx: &ToolchainContext, ids: &[(&str, bool)]) -> DependencyGraph {
        let steps = ids
            .iter()
            .map(|(id, required)| {
                let mut step = autotools_step(tmp.path(), ctx, id);
                step.required = *required;
                seed_source(&step);
                step
            })
            .collect();
        DependencyGraph::new(ctx.role, steps)
    }

    #[test]
    fn test_steps_run_in_order() {
        let tmp = TempDir::new().unwrap();
        let contexts = test_contexts();
        let g = graph(&tmp, &contexts.target, &[("fftw", true), ("essentia", true)]);

        let mut runner = MockRunner::succeeding();
        for step in &g.steps {
            runner.on_times(
                CommandPattern::Exact("make install".into()),
                1,
                touching(&step.cache_marker),
            );
        }

        let mut bcx = BuildContext::new(&mut runner, Environment::empty(), tmp.path(), 1)
            .with_events(EventSink::collecting());
        let reports = GraphExecutor::new(&mut bcx).execute(&g, &contexts.target).unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].id, "fftw");
        assert_eq!(reports[1].id, "essentia");
        assert!(reports.iter().all(|r| r.state == StepState::Installed));
        assert_eq!(bcx.events.events().len(), 2);

        let configures: Vec<String> = runner
            .commands()
            .into_iter()
            .filter(|c| c.contains("/configure"))
            .collect();
        assert!(configures[0].contains("/fftw/src/configure"));
        assert!(configures[1].contains("/essentia/src/configure"));
    }

    #[test]
    fn test_optional_failure_continues() {
        let tmp = TempDir::new().unwrap();
        let contexts = test_contexts();
        let g = graph(&tmp, &contexts.target, &[("madmom", false), ("fftw", true)]);

        let mut runner = MockRunner::succeeding();
        runner.on(CommandPattern::Contains("/madmom/src/configure".into()), |_| {
            MockProcessOutput::failure(1, "configure: error: cython not found")
        });
        runner.on(
            CommandPattern::Exact("make install".into()),
            touching(&g.steps[1].cache_marker),
        );

        let mut bcx = BuildContext::new(&mut runner, Environment::empty(), tmp.path(), 1);
        let reports = GraphExecutor::new(&mut bcx).execute(&g, &contexts.target).unwrap();

        assert!(matches!(reports[0].state, StepState::Failed(_)));
        assert!(!reports[0].is_available());
        assert_eq!(reports[1].state, StepState::Installed);
        assert!(reports[1].is_available());
    }

    #[test]
    fn test_later_steps_search_earlier_prefixes() {
        let tmp = TempDir::new().unwrap();
        let contexts = test_contexts();
        let g = graph(
            &tmp,
            &contexts.target,
            &[("madmom", false), ("fftw", true), ("essentia", true)],
        );
        let fftw_prefix = g.steps[1].install_prefix.clone();
        let madmom_prefix = g.steps[0].install_prefix.clone();

        let mut runner = MockRunner::succeeding();
        runner.on(CommandPattern::Contains("/madmom/src/configure".into()), |_| {
            MockProcessOutput::failure(1, "configure: error: cython not found")
        });
        for step in &g.steps[1..] {
            runner.on_times(
                CommandPattern::Exact("make install".into()),
                1,
                touching(&step.cache_marker),
            );
        }

        let mut bcx = BuildContext::new(&mut runner, Environment::empty(), tmp.path(), 1);
        GraphExecutor::new(&mut bcx).execute(&g, &contexts.target).unwrap();

        let fftw = runner.calls_containing("/fftw/src/configure")[0].clone();
        assert_eq!(fftw.var("CPATH"), None);
        assert_eq!(fftw.var("PKG_CONFIG_LIBDIR"), Some(""));

        let essentia = runner.calls_containing("/essentia/src/configure")[0].clone();
        let include = fftw_prefix.join("include").display().to_string();
        let lib = fftw_prefix.join("lib").display().to_string();
        let pkgconfig = fftw_prefix.join("lib/pkgconfig").display().to_string();
        assert_eq!(essentia.var("CPATH"), Some(include.as_str()));
        assert_eq!(essentia.var("LIBRARY_PATH"), Some(lib.as_str()));
        assert_eq!(essentia.var("PKG_CONFIG_LIBDIR"), Some(pkgconfig.as_str()));
        let madmom = madmom_prefix.display().to_string();
        assert!(!essentia.var("CPATH").unwrap_or_default().contains(&madmom));
    }

    #[test]
    fn test_required_failure_aborts() {
        let tmp = TempDir::new().unwrap();
        let contexts = test_contexts();
        let g = graph(&tmp, &contexts.target, &[("fftw", true), ("essentia", true)]);

        let mut runner = MockRunner::succeeding();
        runner.on(CommandPattern::Contains("/fftw/src/configure".into()), |_| {
            MockProcessOutput::failure(1, "configure: error: C compiler cannot create executables")
        });

        let mut bcx = BuildContext::new(&mut runner, Environment::empty(), tmp.path(), 1);
        let err = GraphExecutor::new(&mut bcx)
            .execute(&g, &contexts.target)
            .unwrap_err();

        assert_eq!(err.unit(), Some("fftw"));
        assert!(!runner.called("/essentia/"));
    }

    #[test]
    fn test_cached_steps_are_reported() {
        let tmp = TempDir::new().unwrap();
        let contexts = test_contexts();
        let g = graph(&tmp, &contexts.target, &[("fftw", true)]);
        touch(&g.steps[0].cache_marker);

        let mut runner = MockRunner::new();
        let mut bcx = BuildContext::new(&mut runner, Environment::empty(), tmp.path(), 1);
        let reports = GraphExecutor::new(&mut bcx).execute(&g, &contexts.target).unwrap();

        assert_eq!(reports[0].state, StepState::Skipped);
        assert!(runner.calls().is_empty());
    }
}
