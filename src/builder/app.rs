//! Building application binaries against the installed dependencies.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::builder::context::BuildContext;
use crate::builder::dual::DualContextBuilder;
use crate::builder::errors::PipelineError;
use crate::builder::events::BuildEvent;
use crate::builder::runner::CommandOutput;
use crate::builder::toolchain::{
    link_exe_command, CommandSpec, LinkInput, ResolvedContexts, ToolchainContext, ToolchainRole,
};
use crate::core::application::{AppDriver, Application};

/// Linker diagnostics reporting unresolved symbols (GNU ld, lld-link, ld64).
static LINK_ERROR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"undefined reference to|unresolved external symbol|Undefined symbols for architecture")
        .expect("link error pattern is valid")
});

/// Whether build output reports unresolved symbols.
pub fn is_link_failure(output: &str) -> bool {
    LINK_ERROR_RE.is_match(output)
}

/// Result of building one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppOutcome {
    /// The binary exists at this path
    Built { binary: PathBuf },
    /// An optional application could not be built
    Degraded { reason: String },
}

/// Builds applications in their primary context.
pub struct ApplicationBuilder<'b, 'a, 'c> {
    bcx: &'b mut BuildContext<'a>,
    contexts: &'c ResolvedContexts,
    dual: &'c DualContextBuilder<'c>,
    unavailable: BTreeSet<(ToolchainRole, String)>,
}

impl<'b, 'a, 'c> ApplicationBuilder<'b, 'a, 'c> {
    pub fn new(
        bcx: &'b mut BuildContext<'a>,
        contexts: &'c ResolvedContexts,
        dual: &'c DualContextBuilder<'c>,
    ) -> Self {
        ApplicationBuilder {
            bcx,
            contexts,
            dual,
            unavailable: BTreeSet::new(),
        }
    }

    /// Record that a library failed to build in a context.
    pub fn mark_unavailable(&mut self, role: ToolchainRole, id: &str) {
        self.unavailable.insert((role, id.to_string()));
    }

    /// Build an application.
    ///
    /// Failures of optional applications are returned as
    /// [`AppOutcome::Degraded`]; failures of required ones as errors.
    pub fn build(&mut self, app: &Application) -> Result<AppOutcome, PipelineError> {
        let result = self.try_build(app);

        let (outcome, event) = match result {
            Ok(binary) => {
                tracing::info!("Built {} ({})", app.name, binary.display());
                let event = BuildEvent::ApplicationFinished {
                    application: app.name.clone(),
                    status: "built".to_string(),
                    message: None,
                    binary: Some(binary.clone()),
                };
                (Ok(AppOutcome::Built { binary }), event)
            }
            Err(err) if app.optional => {
                tracing::warn!("Optional application {} degraded: {}", app.name, err);
                if let Some(tail) = err.tail().filter(|t| !t.is_empty()) {
                    tracing::debug!("{}", tail);
                }
                let reason = degraded_reason(&err);
                let event = BuildEvent::ApplicationFinished {
                    application: app.name.clone(),
                    status: "degraded".to_string(),
                    message: Some(reason.clone()),
                    binary: None,
                };
                (Ok(AppOutcome::Degraded { reason }), event)
            }
            Err(err) => {
                let event = BuildEvent::ApplicationFinished {
                    application: app.name.clone(),
                    status: "failed".to_string(),
                    message: Some(err.to_string()),
                    binary: None,
                };
                (Err(err), event)
            }
        };

        self.bcx.emit(event);
        outcome
    }

    fn try_build(&mut self, app: &Application) -> Result<PathBuf, PipelineError> {
        let primary = app.primary_context();

        if let Some((role, lib)) = self.missing_library(app) {
            return Err(PipelineError::Build {
                unit: app.name.clone(),
                context: format!("{} {}", primary, self.contexts.get(primary).platform.gnu_triple),
                tail: format!("required library `{}` ({}) is not available", lib, role),
            });
        }

        let libs = app.required_libraries.iter().map(|s| s.as_str());
        let ctx = self.dual.search_context(primary, libs);
        let host = if primary == ToolchainRole::Target && app.needs(ToolchainRole::Host) {
            let libs = app.required_libraries.iter().map(|s| s.as_str());
            Some(self.dual.search_context(ToolchainRole::Host, libs))
        } else {
            None
        };

        let (cmd, binary) = self.command(app, &ctx)?;

        let mut vars = match app.driver {
            // Cargo builds host and target code in one process, so every
            // compiler is addressed by triple.
            AppDriver::Cargo { .. } => {
                let mut vars = ctx.triple_scoped_overrides();
                if primary == ToolchainRole::Target {
                    vars.push(("PKG_CONFIG_ALLOW_CROSS".to_string(), "1".to_string()));
                }
                vars
            }
            _ => ctx.environment_overrides(),
        };
        if let Some(ref host) = host {
            vars.extend(host.triple_scoped_overrides());
            vars.extend(host.env_overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        // Configured variables of the primary context win over the host's
        if matches!(app.driver, AppDriver::Cargo { .. }) {
            vars.extend(ctx.env_overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        tracing::info!("Building {} for {}", app.name, ctx.label());
        tracing::debug!("{}", cmd.display_command());

        let output = {
            let BuildContext { runner, env, .. } = &mut *self.bcx;
            let guard = env.scoped(format!("{} ({})", app.name, ctx.label()), vars);
            runner.run(&cmd, &guard)
        };

        let output = output.unwrap_or_else(|e| CommandOutput {
            status: None,
            stdout: String::new(),
            stderr: format!("failed to run `{}`: {:#}", cmd.display_command(), e),
        });

        if !output.success() {
            let combined = output.combined();
            if is_link_failure(&combined) {
                return Err(PipelineError::link(&app.name, &combined));
            }
            return Err(PipelineError::build(&app.name, &ctx.label(), &combined));
        }

        if !binary.is_file() {
            return Err(PipelineError::Build {
                unit: app.name.clone(),
                context: ctx.label(),
                tail: format!("expected binary {} was not produced", binary.display()),
            });
        }

        Ok(binary)
    }

    fn missing_library(&self, app: &Application) -> Option<(ToolchainRole, String)> {
        app.contexts.iter().find_map(|role| {
            app.required_libraries
                .iter()
                .find(|lib| self.unavailable.contains(&(*role, lib.to_string())))
                .map(|lib| (*role, lib.clone()))
        })
    }

    /// Command producing the binary, and where the binary lands.
    fn command(
        &self,
        app: &Application,
        ctx: &ToolchainContext,
    ) -> Result<(CommandSpec, PathBuf), PipelineError> {
        let exe = ctx.platform.exe_name(&app.binary);
        let explicit = app.output.as_ref().map(|o| app.source_unit.join(o));

        match &app.driver {
            AppDriver::Cargo { package, features } => {
                let mut cmd = CommandSpec::new("cargo").arg("build").arg("--release");
                let target_dir = self
                    .bcx
                    .env
                    .get("CARGO_TARGET_DIR")
                    .map(|d| app.source_unit.join(d))
                    .unwrap_or_else(|| app.source_unit.join("target"));

                let default_output = if ctx.role == ToolchainRole::Target {
                    let triple = ctx.platform.rust_triple.to_string();
                    cmd = cmd.arg("--target").arg(triple.clone());
                    target_dir.join(triple).join("release").join(&exe)
                } else {
                    target_dir.join("release").join(&exe)
                };

                if let Some(package) = package {
                    cmd = cmd.arg("-p").arg(package.clone());
                }

                let mut all_features = features.clone();
                if ctx.debug {
                    all_features.extend(app.debug_features.iter().cloned());
                }
                if !all_features.is_empty() {
                    cmd = cmd.arg("--features").arg(all_features.join(","));
                }

                Ok((
                    cmd.cwd(app.source_unit.clone()),
                    explicit.unwrap_or(default_output),
                ))
            }
            AppDriver::Cc {
                sources,
                libs,
                cflags,
                ldflags,
                cxx,
            } => {
                let output = explicit.unwrap_or_else(|| {
                    self.bcx
                        .cache_root
                        .join("apps")
                        .join(format!("{}-{}", ctx.role, ctx.platform.gnu_triple))
                        .join(&app.name)
                        .join(&exe)
                });
                if let Some(parent) = output.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| PipelineError::Build {
                        unit: app.name.clone(),
                        context: ctx.label(),
                        tail: format!("failed to create {}: {}", parent.display(), e),
                    })?;
                }

                let mut all_cflags = vec![if ctx.debug { "-g" } else { "-O2" }.to_string()];
                all_cflags.extend(cflags.iter().cloned());

                let input = LinkInput {
                    sources: sources.iter().map(|s| app.source_unit.join(s)).collect(),
                    output: output.clone(),
                    include_dirs: ctx.include_dirs(),
                    lib_dirs: ctx.lib_dirs(),
                    libs: libs.clone(),
                    cflags: all_cflags,
                    ldflags: ldflags.clone(),
                };
                let cmd = link_exe_command(&ctx.compilers, &input, *cxx).cwd(app.source_unit.clone());
                Ok((cmd, output))
            }
            AppDriver::Command { argv } => {
                let cmd = CommandSpec::from_argv(argv).ok_or_else(|| PipelineError::Build {
                    unit: app.name.clone(),
                    context: ctx.label(),
                    tail: "empty command".to_string(),
                })?;
                let output = explicit.unwrap_or_else(|| app.source_unit.join(&exe));
                Ok((cmd.cwd(app.source_unit.clone()), output))
            }
        }
    }
}

/// Error message followed by the last line of captured output.
fn degraded_reason(err: &PipelineError) -> String {
    match err.tail().and_then(|t| t.lines().rev().find(|l| !l.trim().is_empty())) {
        Some(line) => format!("{}: {}", err, line.trim()),
        None => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::env::Environment;
    use crate::builder::events::EventSink;
    use crate::test_support::{
        contexts_for, test_contexts, touching, CommandPattern, MockProcessOutput, MockRunner,
    };
    use tempfile::TempDir;

    fn cargo_app(source: &std::path::Path, contexts: Vec<ToolchainRole>) -> Application {
        Application {
            name: "mesh-player".to_string(),
            source_unit: source.to_path_buf(),
            contexts,
            required_libraries: vec!["essentia".to_string()],
            optional: false,
            binary: "mesh-player".to_string(),
            output: None,
            driver: AppDriver::Cargo {
                package: Some("mesh-player".to_string()),
                features: vec!["essentia".to_string()],
            },
            debug_features: vec!["console".to_string()],
            data_files: Vec::new(),
        }
    }

    fn target_binary(source: &std::path::Path) -> PathBuf {
        source.join("target/x86_64-pc-windows-gnu/release/mesh-player.exe")
    }

    #[test]
    fn test_link_failure_detection() {
        assert!(is_link_failure(
            "foo.o: in function `main':\nfoo.c:(.text+0x1a): undefined reference to `essentia::init()'"
        ));
        assert!(is_link_failure("error LNK2019: unresolved external symbol _fftwf_plan"));
        assert!(is_link_failure("Undefined symbols for architecture arm64:"));
        assert!(!is_link_failure("error[E0425]: cannot find value `x` in this scope"));
    }

    #[test]
    fn test_cargo_build_for_target() {
        let tmp = TempDir::new().unwrap();
        let contexts = test_contexts();
        let dual = DualContextBuilder::new(&contexts, tmp.path().join("cache"));
        let app = cargo_app(tmp.path(), vec![ToolchainRole::Target]);

        let mut runner = MockRunner::new();
        runner.on(
            CommandPattern::StartsWith("cargo build".into()),
            touching(&target_binary(tmp.path())),
        );

        let mut bcx = BuildContext::new(&mut runner, Environment::empty(), tmp.path().join("cache"), 1);
        let outcome = ApplicationBuilder::new(&mut bcx, &contexts, &dual)
            .build(&app)
            .unwrap();

        assert_eq!(
            outcome,
            AppOutcome::Built {
                binary: target_binary(tmp.path())
            }
        );

        let call = &runner.calls()[0];
        assert_eq!(
            call.command,
            "cargo build --release --target x86_64-pc-windows-gnu -p mesh-player --features essentia"
        );
        assert_eq!(
            call.var("CC_x86_64_pc_windows_gnu"),
            Some("x86_64-w64-mingw32-gcc-posix")
        );
        assert_eq!(
            call.var("CARGO_TARGET_X86_64_PC_WINDOWS_GNU_LINKER"),
            Some("x86_64-w64-mingw32-gcc-posix")
        );
        assert_eq!(call.var("PKG_CONFIG_ALLOW_CROSS"), Some("1"));
        // Target compilers never leak into the generic variables used by build scripts
        assert_eq!(call.var("CC"), None);
        assert_eq!(call.spec.cwd.as_deref(), Some(tmp.path()));
    }

    #[test]
    fn test_debug_features() {
        let tmp = TempDir::new().unwrap();
        let contexts = resolve_debug();
        let dual = DualContextBuilder::new(&contexts, tmp.path().join("cache"));
        let app = cargo_app(tmp.path(), vec![ToolchainRole::Target]);

        let mut runner = MockRunner::new();
        runner.on(CommandPattern::Any, touching(&target_binary(tmp.path())));
        let mut bcx = BuildContext::new(&mut runner, Environment::empty(), tmp.path(), 1);
        ApplicationBuilder::new(&mut bcx, &contexts, &dual)
            .build(&app)
            .unwrap();

        assert!(runner.calls()[0].command.ends_with("--features essentia,console"));
    }

    fn resolve_debug() -> ResolvedContexts {
        crate::builder::toolchain::resolve_contexts(
            "windows",
            true,
            &crate::util::config::ToolchainConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_host_libraries_are_triple_scoped() {
        let tmp = TempDir::new().unwrap();
        let contexts = test_contexts();
        let cache = tmp.path().join("cache");
        let dual = DualContextBuilder::new(&contexts, &cache);
        let app = cargo_app(tmp.path(), vec![ToolchainRole::Target, ToolchainRole::Host]);

        let mut runner = MockRunner::new();
        runner.on(CommandPattern::Any, touching(&target_binary(tmp.path())));
        let mut bcx = BuildContext::new(&mut runner, Environment::empty(), &cache, 1);
        ApplicationBuilder::new(&mut bcx, &contexts, &dual)
            .build(&app)
            .unwrap();

        let call = &runner.calls()[0];
        let host_suffix = contexts.host.platform.rust_triple.env_suffix();
        let host_pc = call
            .var(&format!("PKG_CONFIG_PATH_{}", host_suffix))
            .unwrap();
        assert!(host_pc.contains(&format!("host-{}", contexts.host.platform.gnu_triple)));
        assert!(!host_pc.contains("target-"));

        let target_pc = call.var("PKG_CONFIG_PATH_x86_64_pc_windows_gnu").unwrap();
        assert!(target_pc.contains("target-x86_64-w64-mingw32/essentia"));
        assert_eq!(call.var("HOST_CC"), Some("cc"));
    }

    #[test]
    fn test_cargo_gets_configured_role_environment() {
        let tmp = TempDir::new().unwrap();
        let mut config = crate::util::config::ToolchainConfig::default();
        config.target.sysroot = Some(PathBuf::from("/opt/mingw/sysroot"));
        config.target.env.insert("CFLAGS".to_string(), "-O3".to_string());
        config.target.env.insert("MESH_BUILD".to_string(), "target".to_string());
        config.host.env.insert("MESH_BUILD".to_string(), "host".to_string());
        config.host.env.insert("PYTHONHOME".to_string(), "/usr".to_string());
        let contexts =
            crate::builder::toolchain::resolve_contexts("windows", false, &config).unwrap();
        let dual = DualContextBuilder::new(&contexts, tmp.path().join("cache"));
        let app = cargo_app(tmp.path(), vec![ToolchainRole::Target, ToolchainRole::Host]);

        let mut runner = MockRunner::new();
        runner.on(CommandPattern::Any, touching(&target_binary(tmp.path())));
        let mut bcx = BuildContext::new(&mut runner, Environment::empty(), tmp.path(), 1);
        ApplicationBuilder::new(&mut bcx, &contexts, &dual)
            .build(&app)
            .unwrap();

        let call = &runner.calls()[0];
        assert_eq!(call.var("CFLAGS"), Some("-O3"));
        assert_eq!(call.var("PYTHONHOME"), Some("/usr"));
        assert_eq!(call.var("MESH_BUILD"), Some("target"));
        assert_eq!(
            call.var("PKG_CONFIG_SYSROOT_DIR_x86_64_pc_windows_gnu"),
            Some("/opt/mingw/sysroot")
        );
    }

    #[test]
    fn test_link_error_classification() {
        let tmp = TempDir::new().unwrap();
        let contexts = test_contexts();
        let dual = DualContextBuilder::new(&contexts, tmp.path());
        let app = cargo_app(tmp.path(), vec![ToolchainRole::Target]);

        let mut runner = MockRunner::new();
        runner.expect_contains(
            "cargo build",
            MockProcessOutput::failure(
                101,
                "error: linking with `x86_64-w64-mingw32-gcc-posix` failed\n  = note: undefined reference to `essentia::standard::AlgorithmFactory::create'",
            ),
        );
        let mut bcx = BuildContext::new(&mut runner, Environment::empty(), tmp.path(), 1);
        let err = ApplicationBuilder::new(&mut bcx, &contexts, &dual)
            .build(&app)
            .unwrap_err();

        assert!(matches!(err, PipelineError::Link { .. }));
        assert_eq!(err.unit(), Some("mesh-player"));
        assert!(err.tail().unwrap().contains("AlgorithmFactory"));
    }

    #[test]
    fn test_compile_error_is_build_error() {
        let tmp = TempDir::new().unwrap();
        let contexts = test_contexts();
        let dual = DualContextBuilder::new(&contexts, tmp.path());
        let app = cargo_app(tmp.path(), vec![ToolchainRole::Target]);

        let mut runner = MockRunner::new();
        runner.expect_contains("cargo", MockProcessOutput::failure(101, "error[E0433]: failed to resolve"));
        let mut bcx = BuildContext::new(&mut runner, Environment::empty(), tmp.path(), 1);
        let err = ApplicationBuilder::new(&mut bcx, &contexts, &dual)
            .build(&app)
            .unwrap_err();

        assert!(matches!(err, PipelineError::Build { .. }));
    }

    #[test]
    fn test_missing_binary_is_build_error() {
        let tmp = TempDir::new().unwrap();
        let contexts = test_contexts();
        let dual = DualContextBuilder::new(&contexts, tmp.path());
        let app = cargo_app(tmp.path(), vec![ToolchainRole::Target]);

        let mut runner = MockRunner::succeeding();
        let mut bcx = BuildContext::new(&mut runner, Environment::empty(), tmp.path(), 1);
        let err = ApplicationBuilder::new(&mut bcx, &contexts, &dual)
            .build(&app)
            .unwrap_err();

        assert!(err.tail().unwrap().contains("was not produced"));
    }

    #[test]
    fn test_optional_app_degrades() {
        let tmp = TempDir::new().unwrap();
        let contexts = test_contexts();
        let dual = DualContextBuilder::new(&contexts, tmp.path());
        let mut app = cargo_app(tmp.path(), vec![ToolchainRole::Target, ToolchainRole::Host]);
        app.name = "mesh-cue".to_string();
        app.optional = true;

        let mut runner = MockRunner::new();
        runner.expect_contains("cargo", MockProcessOutput::failure(101, "error: could not compile"));
        let mut bcx = BuildContext::new(&mut runner, Environment::empty(), tmp.path(), 1)
            .with_events(EventSink::collecting());
        let outcome = ApplicationBuilder::new(&mut bcx, &contexts, &dual)
            .build(&app)
            .unwrap();

        assert!(matches!(outcome, AppOutcome::Degraded { .. }));
        match &bcx.events.events()[0] {
            BuildEvent::ApplicationFinished { status, .. } => assert_eq!(status, "degraded"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_unavailable_library_short_circuits() {
        let tmp = TempDir::new().unwrap();
        let contexts = test_contexts();
        let dual = DualContextBuilder::new(&contexts, tmp.path());
        let mut optional = cargo_app(tmp.path(), vec![ToolchainRole::Target]);
        optional.optional = true;
        let required = cargo_app(tmp.path(), vec![ToolchainRole::Target]);

        let mut runner = MockRunner::new();
        let mut bcx = BuildContext::new(&mut runner, Environment::empty(), tmp.path(), 1);
        let mut builder = ApplicationBuilder::new(&mut bcx, &contexts, &dual);
        builder.mark_unavailable(ToolchainRole::Target, "essentia");

        match builder.build(&optional).unwrap() {
            AppOutcome::Degraded { reason } => {
                assert!(reason.starts_with("failed to build `mesh-player`"));
                assert!(reason.ends_with("required library `essentia` (target) is not available"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let err = builder.build(&required).unwrap_err();
        assert!(err.tail().unwrap().contains("`essentia` (target) is not available"));
        drop(builder);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_cc_driver_links_against_prefixes() {
        let tmp = TempDir::new().unwrap();
        let contexts = contexts_for("linux-aarch64");
        let dual = DualContextBuilder::new(&contexts, tmp.path());
        let app = Application {
            name: "beep".to_string(),
            source_unit: tmp.path().to_path_buf(),
            contexts: vec![ToolchainRole::Target],
            required_libraries: vec!["fftw".to_string()],
            optional: false,
            binary: "beep".to_string(),
            output: None,
            driver: AppDriver::Cc {
                sources: vec![PathBuf::from("beep.c")],
                libs: vec!["fftw3f".to_string()],
                cflags: Vec::new(),
                ldflags: Vec::new(),
                cxx: false,
            },
            debug_features: Vec::new(),
            data_files: Vec::new(),
        };
        let binary = tmp.path().join("apps/target-aarch64-linux-gnu/beep/beep");

        let mut runner = MockRunner::new();
        runner.on(CommandPattern::Any, touching(&binary));
        let mut bcx = BuildContext::new(&mut runner, Environment::empty(), tmp.path(), 1);
        let outcome = ApplicationBuilder::new(&mut bcx, &contexts, &dual)
            .build(&app)
            .unwrap();
        assert_eq!(outcome, AppOutcome::Built { binary });

        let call = &runner.calls()[0];
        assert!(call.command.starts_with("aarch64-linux-gnu-gcc -O2"));
        assert!(call
            .command
            .contains(&format!("-L{}", tmp.path().join("target-aarch64-linux-gnu/fftw/lib").display())));
        assert!(call.command.contains("-lfftw3f"));
        assert_eq!(call.var("CC"), Some("aarch64-linux-gnu-gcc"));
    }
}
