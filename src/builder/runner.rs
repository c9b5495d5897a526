//! The subprocess seam.
//!
//! Every external command (build systems, compilers, cargo, objdump) goes
//! through a [`CommandRunner`]. Production code uses [`SystemRunner`]; tests
//! substitute a scripted runner and inspect the recorded calls.

use anyhow::Result;

use crate::builder::env::Environment;
use crate::builder::toolchain::CommandSpec;
use crate::util::process::ProcessBuilder;

/// Captured result of one subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the process exited with status 0.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&self.stderr);
        out
    }
}

/// Runs commands with an explicit environment.
pub trait CommandRunner {
    /// Run a command to completion.
    ///
    /// `env` is the complete environment of the child; the command's own
    /// `env` entries are layered on top. An `Err` means the command could
    /// not be started at all; a non-zero exit is reported in the output.
    fn run(&mut self, cmd: &CommandSpec, env: &Environment) -> Result<CommandOutput>;
}

/// Runs commands as real subprocesses.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        SystemRunner
    }
}

impl CommandRunner for SystemRunner {
    fn run(&mut self, cmd: &CommandSpec, env: &Environment) -> Result<CommandOutput> {
        let mut pb = ProcessBuilder::new(&cmd.program)
            .args(&cmd.args)
            .envs(env.iter())
            .envs(cmd.env.iter().map(|(k, v)| (k, v)));
        if let Some(ref cwd) = cmd.cwd {
            pb = pb.cwd(cwd);
        }

        tracing::debug!("Running: {}", pb.display_command());
        let output = pb.exec()?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
