//! The full cross-build pipeline.
//!
//! Stages run strictly in this order:
//!
//! 1. resolve the host and target contexts
//! 2. build target-context dependencies
//! 3. build applications that need only the target context
//! 4. build host-context dependencies
//! 5. build applications that also need the host context
//! 6. collect runtime libraries and assemble one archive per application
//!
//! A failing required unit aborts the remaining build stages; applications
//! built before the abort are still packaged.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use crate::builder::app::{AppOutcome, ApplicationBuilder};
use crate::builder::context::BuildContext;
use crate::builder::dual::DualContextBuilder;
use crate::builder::errors::PipelineError;
use crate::builder::events::BuildEvent;
use crate::builder::graph::{GraphExecutor, StepReport};
use crate::builder::toolchain::{resolve_contexts, ResolvedContexts, ToolchainRole};
use crate::core::application::Application;
use crate::core::manifest::Manifest;
use crate::core::step::StepState;
use crate::ops::collect::RuntimeCollector;
use crate::ops::package::assemble;
use crate::util::config::ToolchainConfig;

/// Options for one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Platform id; the manifest's default when `None`
    pub platform: Option<String>,
    /// Debug builds (debug features, `-g`)
    pub debug: bool,
    /// Directory receiving the archives
    pub output_dir: PathBuf,
    /// Per-role compiler overrides
    pub toolchain: ToolchainConfig,
}

/// Final status of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AppStatus {
    Packaged { archive: PathBuf },
    Degraded { reason: String },
    Failed { reason: String },
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppStatus::Packaged { archive } => write!(f, "Packaged ({})", archive.display()),
            AppStatus::Degraded { reason } => write!(f, "Degraded: {}", reason),
            AppStatus::Failed { reason } => write!(f, "Failed: {}", reason),
        }
    }
}

/// Status of one application in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppSummary {
    pub name: String,
    pub optional: bool,
    #[serde(flatten)]
    pub status: AppStatus,
}

/// What a pipeline run produced.
#[derive(Debug)]
pub struct PipelineSummary {
    /// Platform id built for
    pub platform: String,
    pub steps: Vec<StepReport>,
    /// Applications in manifest order
    pub applications: Vec<AppSummary>,
    /// Archives written
    pub archives: Vec<PathBuf>,
    /// Non-fatal problems worth repeating at the end
    pub warnings: Vec<String>,
    /// The failure that stopped the build stages
    pub aborted: Option<PipelineError>,
}

impl PipelineSummary {
    /// Whether every required application was packaged.
    pub fn success(&self) -> bool {
        self.aborted.is_none()
            && self
                .applications
                .iter()
                .filter(|a| !a.optional)
                .all(|a| matches!(a.status, AppStatus::Packaged { .. }))
    }

    fn count(&self, pred: impl Fn(&AppStatus) -> bool) -> u64 {
        self.applications.iter().filter(|a| pred(&a.status)).count() as u64
    }

    /// Human-readable summary.
    pub fn render(&self) -> String {
        let mut out = format!("Summary ({})\n", self.platform);
        for app in &self.applications {
            out.push_str(&format!("  {}: {}\n", app.name, app.status));
        }
        if !self.archives.is_empty() {
            out.push_str("Archives:\n");
            for archive in &self.archives {
                out.push_str(&format!("  {}\n", archive.display()));
            }
        }
        if !self.warnings.is_empty() {
            out.push_str(&format!("{} warning(s):\n", self.warnings.len()));
            for warning in &self.warnings {
                out.push_str(&format!("  {}\n", warning));
            }
        }
        out
    }
}

/// Per-application progress through the stages.
struct AppSlot<'m> {
    app: &'m Application,
    binary: Option<PathBuf>,
    status: Option<AppStatus>,
}

struct RunState<'m> {
    slots: Vec<AppSlot<'m>>,
    steps: Vec<StepReport>,
    unavailable: Vec<(ToolchainRole, String)>,
}

impl RunState<'_> {
    fn record_steps(&mut self, reports: Vec<StepReport>) {
        for report in &reports {
            if !report.is_available() {
                self.unavailable.push((report.role, report.id.clone()));
            }
        }
        self.steps.extend(reports);
    }
}

/// Run the pipeline described by a manifest.
///
/// Only context resolution errors are returned as `Err`; failures during
/// the build stages end up in [`PipelineSummary::aborted`] and in the
/// per-application statuses.
pub fn run_pipeline(
    manifest: &Manifest,
    options: &PipelineOptions,
    bcx: &mut BuildContext<'_>,
) -> Result<PipelineSummary, PipelineError> {
    let start = Instant::now();
    let platform_id = options
        .platform
        .clone()
        .unwrap_or_else(|| manifest.pipeline.platform.clone());
    let contexts = resolve_contexts(&platform_id, options.debug, &options.toolchain)?;

    tracing::info!(
        "Building {} for {} (host {})",
        manifest.pipeline.name,
        contexts.target.platform,
        contexts.host.platform.gnu_triple
    );

    let step_count: usize = manifest
        .dependencies
        .iter()
        .map(|d| d.contexts.len())
        .sum();
    bcx.emit(BuildEvent::PipelineStarted {
        pipeline: manifest.pipeline.name.clone(),
        platform: platform_id.clone(),
        target_triple: contexts.target.platform.gnu_triple.clone(),
        steps: step_count as u64,
        applications: manifest.applications.len() as u64,
    });

    let dual = DualContextBuilder::new(&contexts, bcx.cache_root.clone());
    let mut state = RunState {
        slots: manifest
            .applications
            .iter()
            .map(|app| AppSlot {
                app,
                binary: None,
                status: None,
            })
            .collect(),
        steps: Vec::new(),
        unavailable: Vec::new(),
    };

    let aborted = build_stages(manifest, &contexts, &dual, bcx, &mut state).err();
    if let Some(ref err) = aborted {
        let unit = err.unit().unwrap_or("toolchain").to_string();
        tracing::error!("Pipeline aborted at {}: {}", unit, err);
        for slot in state.slots.iter_mut().filter(|s| s.status.is_none() && s.binary.is_none()) {
            let reason = format!("not built: pipeline aborted at {}", unit);
            bcx.emit(BuildEvent::ApplicationFinished {
                application: slot.app.name.clone(),
                status: "failed".to_string(),
                message: Some(reason.clone()),
                binary: None,
            });
            slot.status = Some(AppStatus::Failed { reason });
        }
    }

    let mut warnings = Vec::new();
    let mut archives = Vec::new();
    for slot in state.slots.iter_mut() {
        let Some(binary) = slot.binary.clone() else {
            continue;
        };
        let status = package_app(manifest, options, &contexts, &dual, bcx, slot.app, &binary, &mut warnings);
        if let AppStatus::Packaged { ref archive } = status {
            archives.push(archive.clone());
        }
        slot.status = Some(status);
    }

    let applications: Vec<AppSummary> = state
        .slots
        .into_iter()
        .map(|slot| AppSummary {
            name: slot.app.name.clone(),
            optional: slot.app.optional,
            status: slot.status.unwrap_or_else(|| AppStatus::Failed {
                reason: "not built".to_string(),
            }),
        })
        .collect();

    let summary = PipelineSummary {
        platform: platform_id,
        steps: state.steps,
        applications,
        archives,
        warnings,
        aborted,
    };

    bcx.emit(BuildEvent::PipelineFinished {
        success: summary.success(),
        duration_ms: start.elapsed().as_millis() as u64,
        packaged: summary.count(|s| matches!(s, AppStatus::Packaged { .. })),
        degraded: summary.count(|s| matches!(s, AppStatus::Degraded { .. })),
        failed: summary.count(|s| matches!(s, AppStatus::Failed { .. })),
    });

    tracing::info!(
        "Finished in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    Ok(summary)
}

fn build_stages<'m>(
    manifest: &'m Manifest,
    contexts: &ResolvedContexts,
    dual: &DualContextBuilder<'_>,
    bcx: &mut BuildContext<'_>,
    state: &mut RunState<'m>,
) -> Result<(), PipelineError> {
    let target_graph = dual.graph(&manifest.dependencies, ToolchainRole::Target);
    let reports = GraphExecutor::new(&mut *bcx).execute(&target_graph, &contexts.target)?;
    state.record_steps(reports);

    build_apps(contexts, dual, bcx, state, false)?;

    let host_graph = dual.graph(&manifest.dependencies, ToolchainRole::Host);
    if !host_graph.steps.is_empty() {
        tracing::info!("Building host dependencies for {}", contexts.host.label());
    }
    let reports = GraphExecutor::new(&mut *bcx).execute(&host_graph, &contexts.host)?;
    state.record_steps(reports);

    build_apps(contexts, dual, bcx, state, true)
}

/// Build the applications of one stage, in manifest order.
fn build_apps(
    contexts: &ResolvedContexts,
    dual: &DualContextBuilder<'_>,
    bcx: &mut BuildContext<'_>,
    state: &mut RunState<'_>,
    host_stage: bool,
) -> Result<(), PipelineError> {
    let mut builder = ApplicationBuilder::new(&mut *bcx, contexts, dual);
    for (role, id) in &state.unavailable {
        builder.mark_unavailable(*role, id);
    }

    for slot in state
        .slots
        .iter_mut()
        .filter(|s| s.app.needs_host_stage() == host_stage)
    {
        match builder.build(slot.app) {
            Ok(AppOutcome::Built { binary }) => slot.binary = Some(binary),
            Ok(AppOutcome::Degraded { reason }) => slot.status = Some(AppStatus::Degraded { reason }),
            Err(err) => {
                slot.status = Some(AppStatus::Failed {
                    reason: err.to_string(),
                });
                return Err(err);
            }
        }
    }
    Ok(())
}

/// Collect runtime libraries and write the archive of a built application.
#[allow(clippy::too_many_arguments)]
fn package_app(
    manifest: &Manifest,
    options: &PipelineOptions,
    contexts: &ResolvedContexts,
    dual: &DualContextBuilder<'_>,
    bcx: &mut BuildContext<'_>,
    app: &Application,
    binary: &Path,
    warnings: &mut Vec<String>,
) -> AppStatus {
    let primary = app.primary_context();
    let roles: Vec<ToolchainRole> = [ToolchainRole::Target, ToolchainRole::Host]
        .into_iter()
        .filter(|r| app.needs(*r) || *r == primary)
        .collect();
    let search: Vec<_> = roles
        .iter()
        .map(|role| dual.search_context(*role, app.required_libraries.iter().map(|s| s.as_str())))
        .collect();
    let search_refs: Vec<_> = search.iter().collect();

    let report = RuntimeCollector::new(&mut *bcx)
        .with_fallback_dirs(manifest.pipeline.runtime_search_dirs.iter().cloned())
        .with_system_libraries(&manifest.pipeline.system_libraries)
        .collect(binary, &search_refs);
    for warning in &report.warnings {
        bcx.emit(BuildEvent::warning(format!("{}: {}", app.name, warning)));
        warnings.push(format!("{}: {}", app.name, warning));
    }

    let platform = &contexts.get(primary).platform;
    match assemble(app, binary, &report.artifacts, platform, &options.output_dir) {
        Ok(package) => {
            let mut files: Vec<PathBuf> = std::iter::once(&package.binary)
                .chain(&package.extra_artifacts)
                .map(|a| PathBuf::from(&app.name).join(&a.destination_name))
                .collect();
            files.sort();
            bcx.emit(BuildEvent::PackageCreated {
                application: app.name.clone(),
                archive: package.archive_path.clone(),
                files,
            });
            AppStatus::Packaged {
                archive: package.archive_path,
            }
        }
        Err(err) if app.optional => {
            tracing::warn!("Optional application {} degraded: {}", app.name, err);
            AppStatus::Degraded {
                reason: err.to_string(),
            }
        }
        Err(err) => {
            tracing::error!("{}", err);
            AppStatus::Failed {
                reason: err.to_string(),
            }
        }
    }
}

/// Steps of a manifest that a run would attempt, with their cache state.
pub fn planned_steps(manifest: &Manifest, contexts: &ResolvedContexts, cache_root: &Path) -> Vec<StepReport> {
    let dual = DualContextBuilder::new(contexts, cache_root);
    [ToolchainRole::Target, ToolchainRole::Host]
        .into_iter()
        .flat_map(|role| dual.graph(&manifest.dependencies, role).steps)
        .map(|step| StepReport {
            state: if step.is_cached() {
                StepState::Skipped
            } else {
                StepState::Pending
            },
            id: step.id,
            role: step.role,
            prefix: step.install_prefix,
        })
        .collect()
}
