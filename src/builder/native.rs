//! Native build-system drivers.
//!
//! Turns a [`BuildStep`] and the [`ToolchainContext`] it is built in into the
//! configure, build and install commands of its build system. Nothing here
//! runs a process; the executor hands the commands to a runner.

use std::path::Path;

use crate::builder::env::Environment;
use crate::builder::toolchain::{
    join_search_path, CommandSpec, ToolchainContext, ToolchainRole, SEARCH_PATH_SEP,
};
use crate::core::platform::{BinaryFormat, TargetPlatform};
use crate::core::step::{BuildStep, BuildSystem};

/// Commands for one step in one context.
pub struct NativeBuild<'a> {
    step: &'a BuildStep,
    ctx: &'a ToolchainContext,
    jobs: usize,
}

impl<'a> NativeBuild<'a> {
    pub fn new(step: &'a BuildStep, ctx: &'a ToolchainContext, jobs: usize) -> Self {
        NativeBuild {
            step,
            ctx,
            jobs: jobs.max(1),
        }
    }

    fn is_cross(&self) -> bool {
        self.ctx.role == ToolchainRole::Target
    }

    /// Command of the configure phase, `None` when the build system has none.
    pub fn configure_command(&self) -> Option<CommandSpec> {
        let step = self.step;
        let cmd = match &step.build_system {
            BuildSystem::CMake => self.cmake_configure(),
            BuildSystem::Autotools => {
                let mut cmd = CommandSpec::new(step.src_dir().join("configure"))
                    .arg(format!("--prefix={}", step.install_prefix.display()));
                if self.is_cross() {
                    cmd = cmd
                        .arg(format!("--host={}", self.ctx.platform.gnu_triple))
                        .arg(format!("--build={}", TargetPlatform::host().gnu_triple));
                }
                cmd.args(step.configure_args.iter().cloned())
                    .cwd(step.build_dir())
            }
            BuildSystem::Waf => CommandSpec::new("python3")
                .arg("waf")
                .arg("configure")
                .arg(format!("--prefix={}", step.install_prefix.display()))
                .arg(format!("--out={}", step.build_dir().display()))
                .args(step.configure_args.iter().cloned())
                .cwd(step.src_dir()),
            BuildSystem::Custom(custom) => {
                let argv = self.expand_all(&custom.configure);
                CommandSpec::from_argv(&argv)?
                    .args(self.expand_all(&step.configure_args))
                    .cwd(step.src_dir())
            }
        };
        Some(cmd)
    }

    fn cmake_configure(&self) -> CommandSpec {
        let step = self.step;
        let ctx = self.ctx;
        let compilers = &ctx.compilers;

        let mut cmd = CommandSpec::new("cmake")
            .arg("-S")
            .arg(path_arg(&step.src_dir()))
            .arg("-B")
            .arg(path_arg(&step.build_dir()))
            .arg("-DCMAKE_BUILD_TYPE=Release")
            .arg(format!("-DCMAKE_INSTALL_PREFIX={}", step.install_prefix.display()))
            .arg(format!("-DCMAKE_C_COMPILER={}", compilers.cc.display()))
            .arg(format!("-DCMAKE_CXX_COMPILER={}", compilers.cxx.display()))
            .arg(format!("-DCMAKE_AR={}", compilers.ar.display()))
            .arg(format!("-DCMAKE_RANLIB={}", compilers.ranlib.display()));

        if self.is_cross() {
            let system_name = match ctx.platform.binary_format {
                BinaryFormat::Pe => "Windows",
                BinaryFormat::Elf => "Linux",
            };
            cmd = cmd
                .arg(format!("-DCMAKE_SYSTEM_NAME={}", system_name))
                .arg(format!("-DCMAKE_SYSTEM_PROCESSOR={}", ctx.platform.rust_triple.arch));

            let mut roots: Vec<String> = ctx.sysroot.iter().map(|p| path_arg(p)).collect();
            roots.extend(ctx.search_paths.iter().map(|p| path_arg(p)));
            if !roots.is_empty() {
                cmd = cmd
                    .arg(format!("-DCMAKE_FIND_ROOT_PATH={}", roots.join(";")))
                    .arg("-DCMAKE_FIND_ROOT_PATH_MODE_PROGRAM=NEVER")
                    .arg("-DCMAKE_FIND_ROOT_PATH_MODE_LIBRARY=ONLY")
                    .arg("-DCMAKE_FIND_ROOT_PATH_MODE_INCLUDE=ONLY");
            }
        }

        if !ctx.search_paths.is_empty() {
            let prefixes: Vec<String> = ctx.search_paths.iter().map(|p| path_arg(p)).collect();
            cmd = cmd.arg(format!("-DCMAKE_PREFIX_PATH={}", prefixes.join(";")));
        }

        if !step.ldflags.is_empty() {
            let flags = step.ldflags.join(" ");
            cmd = cmd
                .arg(format!("-DCMAKE_SHARED_LINKER_FLAGS={}", flags))
                .arg(format!("-DCMAKE_EXE_LINKER_FLAGS={}", flags));
        }

        cmd.args(step.configure_args.iter().cloned())
    }

    /// Command of the build phase.
    pub fn build_command(&self) -> Option<CommandSpec> {
        let step = self.step;
        if let Some(ref argv) = step.build_command {
            return Some(CommandSpec::from_argv(&self.expand_all(argv))?.cwd(step.src_dir()));
        }

        let cmd = match &step.build_system {
            BuildSystem::CMake => CommandSpec::new("cmake")
                .arg("--build")
                .arg(path_arg(&step.build_dir()))
                .arg("--parallel")
                .arg(self.jobs.to_string()),
            BuildSystem::Autotools => CommandSpec::new("make")
                .arg(format!("-j{}", self.jobs))
                .cwd(step.build_dir()),
            BuildSystem::Waf => CommandSpec::new("python3")
                .arg("waf")
                .arg("build")
                .arg(format!("-j{}", self.jobs))
                .cwd(step.src_dir()),
            BuildSystem::Custom(custom) => {
                CommandSpec::from_argv(&self.expand_all(&custom.build))?.cwd(step.src_dir())
            }
        };
        Some(cmd)
    }

    /// Command of the install phase.
    pub fn install_command(&self) -> Option<CommandSpec> {
        let step = self.step;
        if let Some(ref argv) = step.install_command {
            return Some(CommandSpec::from_argv(&self.expand_all(argv))?.cwd(step.src_dir()));
        }

        let cmd = match &step.build_system {
            BuildSystem::CMake => CommandSpec::new("cmake")
                .arg("--install")
                .arg(path_arg(&step.build_dir())),
            BuildSystem::Autotools => CommandSpec::new("make").arg("install").cwd(step.build_dir()),
            BuildSystem::Waf => CommandSpec::new("python3")
                .arg("waf")
                .arg("install")
                .cwd(step.src_dir()),
            BuildSystem::Custom(custom) => {
                CommandSpec::from_argv(&self.expand_all(&custom.install))?.cwd(step.src_dir())
            }
        };
        Some(cmd)
    }

    /// Step-specific variables, layered over the applied context.
    ///
    /// Linker flags are appended to whatever the context set, and a reused
    /// installation's headers go last on the include path.
    pub fn step_env(&self, current: &Environment) -> Vec<(String, String)> {
        let step = self.step;
        let mut vars: Vec<(String, String)> = Vec::new();

        if !step.ldflags.is_empty() {
            let extra = step.ldflags.join(" ");
            let ldflags = append_flags(current.get("LDFLAGS"), &extra);
            vars.push(("LDFLAGS".to_string(), ldflags));
            if step.build_system == BuildSystem::Waf {
                vars.push((
                    "LINKFLAGS".to_string(),
                    append_flags(current.get("LINKFLAGS"), &extra),
                ));
            }
        }

        if let Some(ref reuse) = step.reuse_prefix {
            let include = reuse.join("include");
            let cpath = match current.get("CPATH").filter(|v| !v.is_empty()) {
                Some(existing) => format!("{}{}{}", existing, SEARCH_PATH_SEP, include.display()),
                None => join_search_path(&[include]),
            };
            vars.push(("CPATH".to_string(), cpath));
        }

        vars.extend(step.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars
    }

    fn expand_all(&self, argv: &[String]) -> Vec<String> {
        argv.iter().map(|a| self.step.expand(a, self.jobs)).collect()
    }
}

fn append_flags(existing: Option<&str>, extra: &str) -> String {
    match existing.filter(|v| !v.trim().is_empty()) {
        Some(existing) => format!("{} {}", existing, extra),
        None => extra.to_string(),
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}
