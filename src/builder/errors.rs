//! Pipeline error taxonomy.

use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// Number of trailing output lines kept in errors.
pub const OUTPUT_TAIL_LINES: usize = 20;

/// Error raised by a pipeline stage.
///
/// Each variant names the unit that failed. Subprocess failures carry the
/// last [`OUTPUT_TAIL_LINES`] lines of combined output.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum PipelineError {
    #[error("no cross-compiler mapping for platform `{platform}`")]
    #[diagnostic(
        code(crossbuild::toolchain::unsupported_platform),
        help("supported platforms: {supported}")
    )]
    UnsupportedPlatform { platform: String, supported: String },

    #[error("failed to fetch sources of `{step}`: {message}")]
    #[diagnostic(code(crossbuild::fetch))]
    Fetch { step: String, message: String },

    #[error("failed to configure `{step}` ({context})")]
    #[diagnostic(code(crossbuild::step::configure))]
    Configure {
        step: String,
        context: String,
        tail: String,
    },

    #[error("failed to build `{unit}` ({context})")]
    #[diagnostic(code(crossbuild::build))]
    Build {
        unit: String,
        context: String,
        tail: String,
    },

    #[error("`{step}` installed without producing its marker {}", marker.display())]
    #[diagnostic(
        code(crossbuild::step::install),
        help("check that the marker path names a file the install step creates")
    )]
    Install { step: String, marker: PathBuf },

    #[error("unresolved symbols while linking `{unit}`")]
    #[diagnostic(code(crossbuild::link))]
    Link { unit: String, tail: String },

    #[error("failed to package `{application}`: {message}")]
    #[diagnostic(code(crossbuild::package))]
    Packaging { application: String, message: String },

    #[error("invalid manifest: {message}")]
    #[diagnostic(code(crossbuild::manifest))]
    Manifest { message: String },
}

impl PipelineError {
    /// Create a configure error from captured output.
    pub fn configure(step: &str, context: &str, output: &str) -> Self {
        PipelineError::Configure {
            step: step.to_string(),
            context: context.to_string(),
            tail: output_tail(output),
        }
    }

    /// Create a build error from captured output.
    pub fn build(unit: &str, context: &str, output: &str) -> Self {
        PipelineError::Build {
            unit: unit.to_string(),
            context: context.to_string(),
            tail: output_tail(output),
        }
    }

    /// Create a link error from captured output.
    pub fn link(unit: &str, output: &str) -> Self {
        PipelineError::Link {
            unit: unit.to_string(),
            tail: output_tail(output),
        }
    }

    /// Create a fetch error.
    pub fn fetch(step: &str, err: impl std::fmt::Display) -> Self {
        PipelineError::Fetch {
            step: step.to_string(),
            message: err.to_string(),
        }
    }

    /// Create a packaging error.
    pub fn packaging(application: &str, err: &anyhow::Error) -> Self {
        PipelineError::Packaging {
            application: application.to_string(),
            message: format!("{:#}", err),
        }
    }

    /// Create a manifest error.
    pub fn manifest(message: impl Into<String>) -> Self {
        PipelineError::Manifest {
            message: message.into(),
        }
    }

    /// The step or application this error is about, if any.
    pub fn unit(&self) -> Option<&str> {
        match self {
            PipelineError::Fetch { step, .. }
            | PipelineError::Configure { step, .. }
            | PipelineError::Install { step, .. } => Some(step),
            PipelineError::Build { unit, .. } | PipelineError::Link { unit, .. } => Some(unit),
            PipelineError::Packaging { application, .. } => Some(application),
            PipelineError::UnsupportedPlatform { .. } | PipelineError::Manifest { .. } => None,
        }
    }

    /// Captured output tail, if the error came from a subprocess.
    pub fn tail(&self) -> Option<&str> {
        match self {
            PipelineError::Configure { tail, .. }
            | PipelineError::Build { tail, .. }
            | PipelineError::Link { tail, .. } => Some(tail),
            _ => None,
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::error(self.to_string());

        match self {
            PipelineError::UnsupportedPlatform { supported, .. } => {
                diag = diag.with_context(format!("supported platforms: {}", supported));
            }
            PipelineError::Fetch { .. } => {
                diag = diag.with_suggestion(suggestions::FETCH_FAILED);
            }
            PipelineError::Configure { tail, .. } | PipelineError::Build { tail, .. } => {
                diag = diag
                    .with_output(tail)
                    .with_suggestion(suggestions::BUILD_FAILED);
            }
            PipelineError::Install { marker, .. } => {
                diag = diag.with_location(marker.clone());
            }
            PipelineError::Link { tail, .. } => {
                diag = diag
                    .with_output(tail)
                    .with_suggestion(suggestions::LINK_FAILED)
                    .with_suggestion(suggestions::STALE_CACHE);
            }
            PipelineError::Packaging { .. } => {}
            PipelineError::Manifest { .. } => {
                diag = diag.with_suggestion(suggestions::NO_MANIFEST);
            }
        }

        diag
    }
}

/// Keep the last [`OUTPUT_TAIL_LINES`] lines of subprocess output.
pub fn output_tail(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
    lines[start..].join("\n")
}
