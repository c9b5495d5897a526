//! Scripted command runner and fixtures for unit tests.
//!
//! The pipeline talks to the outside world only through
//! [`CommandRunner`](crate::builder::runner::CommandRunner), so a scripted
//! runner is enough to exercise every stage without a cross toolchain.
//!
//! # Example
//!
//! ```rust,ignore
//! use crossbuild::test_support::{touching, CommandPattern, MockProcessOutput, MockRunner};
//!
//! let mut runner = MockRunner::new();
//! runner.on(CommandPattern::StartsWith("make install".into()), touching(&marker));
//! runner.set_default(MockProcessOutput::success(""));
//! ```

pub mod fixtures;

use std::path::Path;

use anyhow::{bail, Result};

use crate::builder::env::Environment;
use crate::builder::runner::{CommandOutput, CommandRunner};
use crate::builder::toolchain::CommandSpec;

pub use fixtures::*;

/// Canned result of a mocked command.
#[derive(Debug, Clone)]
pub struct MockProcessOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl MockProcessOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        MockProcessOutput {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        MockProcessOutput {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

impl From<MockProcessOutput> for CommandOutput {
    fn from(out: MockProcessOutput) -> Self {
        CommandOutput {
            status: Some(out.status),
            stdout: out.stdout,
            stderr: out.stderr,
        }
    }
}

/// Which command lines a [`MockRunner`] rule answers, matched against
/// `program arg1 arg2 ...`.
#[derive(Debug, Clone)]
pub enum CommandPattern {
    Exact(String),
    StartsWith(String),
    Contains(String),
    Any,
}

impl CommandPattern {
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::StartsWith(s) => cmd.starts_with(s.as_str()),
            CommandPattern::Contains(s) => cmd.contains(s.as_str()),
            CommandPattern::Any => true,
        }
    }
}

/// One command seen by the [`MockRunner`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Displayed command line
    pub command: String,
    pub spec: CommandSpec,
    /// Complete environment the child would have received
    pub env: Environment,
}

impl RecordedCall {
    /// Value of a variable in the child's environment.
    pub fn var(&self, key: &str) -> Option<&str> {
        self.env.get(key)
    }
}

type Handler = Box<dyn FnMut(&RecordedCall) -> MockProcessOutput>;

struct Rule {
    pattern: CommandPattern,
    handler: Handler,
    times: Option<usize>,
    used: usize,
}

/// Scripted [`CommandRunner`].
///
/// Rules are tried in registration order; the first matching rule with uses
/// left answers the call. Handlers may touch the filesystem, which is how
/// tests simulate an install step creating its marker.
#[derive(Default)]
pub struct MockRunner {
    rules: Vec<Rule>,
    calls: Vec<RecordedCall>,
    default_output: Option<MockProcessOutput>,
}

impl MockRunner {
    /// Create a runner that rejects every command.
    pub fn new() -> Self {
        MockRunner::default()
    }

    /// Create a runner that succeeds silently for every command.
    pub fn succeeding() -> Self {
        let mut runner = MockRunner::new();
        runner.set_default(MockProcessOutput::success(""));
        runner
    }

    /// Answer matching commands with a handler.
    pub fn on<F>(&mut self, pattern: CommandPattern, handler: F) -> &mut Self
    where
        F: FnMut(&RecordedCall) -> MockProcessOutput + 'static,
    {
        self.rules.push(Rule {
            pattern,
            handler: Box::new(handler),
            times: None,
            used: 0,
        });
        self
    }

    /// Answer matching commands with a handler, at most `n` times.
    pub fn on_times<F>(&mut self, pattern: CommandPattern, n: usize, handler: F) -> &mut Self
    where
        F: FnMut(&RecordedCall) -> MockProcessOutput + 'static,
    {
        self.on(pattern, handler);
        if let Some(rule) = self.rules.last_mut() {
            rule.times = Some(n);
        }
        self
    }

    /// Answer commands containing a substring with a fixed output.
    pub fn expect_contains(&mut self, substring: &str, output: MockProcessOutput) -> &mut Self {
        self.on(CommandPattern::Contains(substring.to_string()), move |_| {
            output.clone()
        })
    }

    /// Set a default output for commands that don't match any rule.
    pub fn set_default(&mut self, output: MockProcessOutput) -> &mut Self {
        self.default_output = Some(output);
        self
    }

    /// All recorded calls in order.
    pub fn calls(&self) -> &[RecordedCall] {
        &self.calls
    }

    /// Displayed command lines of all recorded calls.
    pub fn commands(&self) -> Vec<String> {
        self.calls.iter().map(|c| c.command.clone()).collect()
    }

    /// Calls whose command line contains a substring.
    pub fn calls_containing(&self, substring: &str) -> Vec<&RecordedCall> {
        self.calls
            .iter()
            .filter(|c| c.command.contains(substring))
            .collect()
    }

    /// Whether any call contained a substring.
    pub fn called(&self, substring: &str) -> bool {
        !self.calls_containing(substring).is_empty()
    }
}

impl CommandRunner for MockRunner {
    fn run(&mut self, cmd: &CommandSpec, env: &Environment) -> Result<CommandOutput> {
        let mut effective = env.clone();
        for (key, value) in &cmd.env {
            effective.set(key.clone(), value.clone());
        }

        let call = RecordedCall {
            command: cmd.display_command(),
            spec: cmd.clone(),
            env: effective,
        };
        self.calls.push(call.clone());

        for rule in &mut self.rules {
            let available = rule.times.map_or(true, |n| rule.used < n);
            if available && rule.pattern.matches(&call.command) {
                rule.used += 1;
                return Ok((rule.handler)(&call).into());
            }
        }

        if let Some(ref default) = self.default_output {
            return Ok(default.clone().into());
        }

        bail!("unexpected command: {}", call.command)
    }
}

/// Create a file and its parent directories.
pub fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, b"").unwrap();
}

/// Handler that creates a file and succeeds, standing in for an install.
pub fn touching(path: &Path) -> impl FnMut(&RecordedCall) -> MockProcessOutput + 'static {
    let path = path.to_path_buf();
    move |_| {
        touch(&path);
        MockProcessOutput::success("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_pattern_matching() {
        assert!(CommandPattern::Exact("make -j4".into()).matches("make -j4"));
        assert!(!CommandPattern::Exact("make -j4".into()).matches("make -j4 install"));
        assert!(CommandPattern::StartsWith("./waf".into()).matches("./waf configure"));
        assert!(CommandPattern::Contains("install".into()).matches("make -j4 install"));
        assert!(CommandPattern::Any.matches("cargo build"));
    }

    #[test]
    fn test_mock_runner_records_environment() {
        let mut runner = MockRunner::succeeding();
        let env: Environment = [("CC", "cc")].into_iter().collect();
        let cmd = CommandSpec::new("make").arg("-j2").env("LDFLAGS", "-s");

        runner.run(&cmd, &env).unwrap();

        let call = &runner.calls()[0];
        assert_eq!(call.command, "make -j2");
        assert_eq!(call.var("CC"), Some("cc"));
        assert_eq!(call.var("LDFLAGS"), Some("-s"));
    }

    #[test]
    fn test_mock_runner_rule_order_and_times() {
        let mut runner = MockRunner::new();
        runner.on_times(CommandPattern::Contains("make".into()), 1, |_| {
            MockProcessOutput::failure(2, "first")
        });
        runner.expect_contains("make", MockProcessOutput::success("second"));

        let env = Environment::empty();
        let cmd = CommandSpec::new("make");
        assert_eq!(runner.run(&cmd, &env).unwrap().stderr, "first");
        assert_eq!(runner.run(&cmd, &env).unwrap().stdout, "second");
    }

    #[test]
    fn test_mock_runner_rejects_unexpected() {
        let mut runner = MockRunner::new();
        let err = runner
            .run(&CommandSpec::new("ninja"), &Environment::empty())
            .unwrap_err();
        assert!(err.to_string().contains("unexpected command: ninja"));
    }

    #[test]
    fn test_touching_creates_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let marker = tmp.path().join("prefix/lib/libfoo.a");
        let mut runner = MockRunner::new();
        runner.on(CommandPattern::Any, touching(&marker));

        runner
            .run(&CommandSpec::new("make").arg("install"), &Environment::empty())
            .unwrap();
        assert!(marker.exists());
    }
}
