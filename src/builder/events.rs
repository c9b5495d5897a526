//! Pipeline event types for JSON output.
//!
//! This module defines the JSON schema for machine-readable pipeline output.
//! These events are emitted when using `--message-format=json`.
//!
//! # Event Types
//!
//! - `pipeline-started`: Toolchains resolved, work is about to start
//! - `step-finished`: A dependency step was skipped, installed or failed
//! - `application-finished`: An application was built, degraded or failed
//! - `package-created`: An archive was written
//! - `diagnostic`: A warning or note worth surfacing
//! - `pipeline-finished`: Final summary
//!
//! # Stability
//!
//! New fields may be added, but existing fields should not be removed or renamed.

use std::path::PathBuf;

use serde::Serialize;

/// An event emitted while the pipeline runs.
///
/// Each event is serialized as a single JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason")]
pub enum BuildEvent {
    /// Work is about to start.
    #[serde(rename = "pipeline-started")]
    PipelineStarted {
        /// Pipeline name from the manifest
        pipeline: String,
        /// Target platform id (e.g., "windows")
        platform: String,
        /// Target GNU triple (e.g., "x86_64-w64-mingw32")
        target_triple: String,
        /// Number of dependency steps across both contexts
        steps: u64,
        /// Number of applications
        applications: u64,
    },

    /// A dependency step finished.
    #[serde(rename = "step-finished")]
    StepFinished {
        /// Dependency id
        step: String,
        /// "host" or "target"
        context: String,
        /// "cached", "installed" or "failed"
        state: String,
        /// Failure reason
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Install prefix
        prefix: PathBuf,
    },

    /// An application finished building.
    #[serde(rename = "application-finished")]
    ApplicationFinished {
        application: String,
        /// "built", "degraded" or "failed"
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        binary: Option<PathBuf>,
    },

    /// An archive was written.
    #[serde(rename = "package-created")]
    PackageCreated {
        application: String,
        archive: PathBuf,
        /// Archive entries, relative to the archive root
        files: Vec<PathBuf>,
    },

    /// A generic diagnostic message.
    #[serde(rename = "diagnostic")]
    Diagnostic {
        /// Severity level ("error", "warning", "note")
        level: String,
        /// Message text
        message: String,
    },

    /// The pipeline completed (success or failure).
    #[serde(rename = "pipeline-finished")]
    PipelineFinished {
        /// Whether every required application was packaged
        success: bool,
        /// Total duration in milliseconds
        duration_ms: u64,
        packaged: u64,
        degraded: u64,
        failed: u64,
    },
}

impl BuildEvent {
    /// Create a step finished event.
    pub fn step(
        step: impl Into<String>,
        context: impl Into<String>,
        state: impl Into<String>,
        prefix: PathBuf,
    ) -> Self {
        BuildEvent::StepFinished {
            step: step.into(),
            context: context.into(),
            state: state.into(),
            message: None,
            prefix,
        }
    }

    /// Create a warning diagnostic event.
    pub fn warning(message: impl Into<String>) -> Self {
        BuildEvent::Diagnostic {
            level: "warning".to_string(),
            message: message.into(),
        }
    }

    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Where events go.
#[derive(Debug, Default)]
pub struct EventSink {
    mode: SinkMode,
}

#[derive(Debug, Default)]
enum SinkMode {
    #[default]
    Silent,
    Stdout,
    Collect(Vec<BuildEvent>),
}

impl EventSink {
    /// Drop all events (human output mode).
    pub fn silent() -> Self {
        EventSink::default()
    }

    /// Print each event as one JSON line on stdout.
    pub fn stdout() -> Self {
        EventSink {
            mode: SinkMode::Stdout,
        }
    }

    /// Keep events in memory.
    pub fn collecting() -> Self {
        EventSink {
            mode: SinkMode::Collect(Vec::new()),
        }
    }

    pub fn emit(&mut self, event: BuildEvent) {
        match &mut self.mode {
            SinkMode::Silent => {}
            SinkMode::Stdout => println!("{}", event.to_json()),
            SinkMode::Collect(events) => events.push(event),
        }
    }

    /// Events kept by a collecting sink.
    pub fn events(&self) -> &[BuildEvent] {
        match &self.mode {
            SinkMode::Collect(events) => events,
            _ => &[],
        }
    }

    /// Whether events are printed as JSON.
    pub fn is_json(&self) -> bool {
        matches!(self.mode, SinkMode::Stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_serialization() {
        let event = BuildEvent::step(
            "essentia",
            "target",
            "installed",
            PathBuf::from("/cache/target-x86_64-w64-mingw32/essentia"),
        );
        let json = event.to_json();
        assert!(json.contains("\"reason\":\"step-finished\""));
        assert!(json.contains("\"step\":\"essentia\""));
        assert!(json.contains("\"state\":\"installed\""));
        assert!(!json.contains("\"message\""));
    }

    #[test]
    fn test_finished_serialization() {
        let event = BuildEvent::PipelineFinished {
            success: false,
            duration_ms: 2340,
            packaged: 1,
            degraded: 1,
            failed: 0,
        };
        let json = event.to_json();
        assert!(json.contains("\"reason\":\"pipeline-finished\""));
        assert!(json.contains("\"success\":false"));
        assert!(json.contains("\"duration_ms\":2340"));
    }

    #[test]
    fn test_collecting_sink() {
        let mut sink = EventSink::collecting();
        sink.emit(BuildEvent::warning("libgomp-1.dll not found"));
        assert_eq!(sink.events().len(), 1);

        let mut silent = EventSink::silent();
        silent.emit(BuildEvent::warning("ignored"));
        assert!(silent.events().is_empty());
        assert!(!silent.is_json());
    }
}
