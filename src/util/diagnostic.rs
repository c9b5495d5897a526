//! User-friendly diagnostic messages.
//!
//! Every failure shown to the user names the unit that failed, the output
//! that explains why, and what to try next.

use std::fmt;
use std::path::PathBuf;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion when no manifest file is found.
    pub const NO_MANIFEST: &str =
        "Create a Crossbuild.toml or pass `--manifest <path>` to point at one";

    /// Suggestion when a build step fails.
    pub const BUILD_FAILED: &str = "Run `crossbuild build --verbose` to see every command";

    /// Suggestion for fetch failures.
    pub const FETCH_FAILED: &str =
        "Check your network connection and the `sha256` recorded in the manifest";

    /// Suggestion when a cached step must be rebuilt.
    pub const STALE_CACHE: &str = "Run `crossbuild cache clean <step>` to force a rebuild";

    /// Suggestion for unresolved symbols on hidden-by-default targets.
    pub const LINK_FAILED: &str =
        "Clean the library step so it is rebuilt with `-Wl,--export-all-symbols`";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn label(self, color: bool) -> &'static str {
        match (self, color) {
            (Severity::Error, false) => "error",
            (Severity::Warning, false) => "warning",
            (Severity::Error, true) => "\x1b[1;31merror\x1b[0m",
            (Severity::Warning, true) => "\x1b[1;33mwarning\x1b[0m",
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Captured subprocess output
    pub output: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Related location (file path)
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    fn new(message: impl Into<String>, severity: Severity) -> Self {
        Diagnostic {
            message: message.into(),
            severity,
            context: Vec::new(),
            output: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Error)
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Warning)
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Attach captured output, one entry per line.
    pub fn with_output(mut self, output: &str) -> Self {
        self.output
            .extend(output.lines().filter(|l| !l.trim().is_empty()).map(str::to_string));
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a file location.
    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write_to(&mut out, color);
        out
    }

    fn write_to(&self, out: &mut impl fmt::Write, color: bool) -> fmt::Result {
        writeln!(out, "{}: {}", self.severity.label(color), self.message)?;
        if let Some(ref path) = self.location {
            writeln!(out, "  --> {}", path.display())?;
        }
        for line in &self.context {
            writeln!(out, "  = {}", line)?;
        }
        if !self.output.is_empty() {
            writeln!(out, "  output:")?;
            for line in &self.output {
                writeln!(out, "  | {}", line)?;
            }
        }
        if !self.suggestions.is_empty() {
            let help = if color { "\x1b[1;32mhelp\x1b[0m" } else { "help" };
            writeln!(out, "\n{}: consider:", help)?;
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                writeln!(out, "  {}. {}", i + 1, suggestion)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_to(f, false)
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_formatting() {
        let diag = Diagnostic::error("failed to configure `essentia` (target x86_64-w64-mingw32)")
            .with_context("command: python3 waf configure --prefix=/cache/essentia")
            .with_output("Checking for fftw3\n\nnot found\n")
            .with_suggestion(suggestions::BUILD_FAILED);

        let output = diag.format(false);
        assert!(output.contains("error: failed to configure `essentia`"));
        assert!(output.contains("= command: python3 waf"));
        assert!(output.contains("| not found"));
        assert_eq!(diag.output.len(), 2);
        assert!(output.contains("help: consider:"));
        assert!(output.contains("1. Run `crossbuild build --verbose`"));
    }

    #[test]
    fn test_warning_with_location() {
        let diag = Diagnostic::warning("unresolved runtime library `libfoo.dll`")
            .with_location("/out/mesh-cue.exe");
        let output = diag.to_string();
        assert!(output.starts_with("warning: unresolved runtime library"));
        assert!(output.contains("--> /out/mesh-cue.exe"));
    }
}
