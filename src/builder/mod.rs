//! Native dependency and application builds.
//!
//! This module holds the toolchain contexts, the cache-checked step executor,
//! the dual-context dependency builder and the application builder.

pub mod app;
pub mod context;
pub mod dual;
pub mod env;
pub mod errors;
pub mod events;
pub mod executor;
pub mod fingerprint;
pub mod graph;
pub mod native;
pub mod runner;
pub mod toolchain;

pub use app::{AppOutcome, ApplicationBuilder};
pub use context::BuildContext;
pub use dual::DualContextBuilder;
pub use env::{EnvGuard, Environment};
pub use errors::PipelineError;
pub use events::{BuildEvent, EventSink};
pub use executor::{StepExecutor, StepOutcome};
pub use graph::{GraphExecutor, StepReport};
pub use runner::{CommandOutput, CommandRunner, SystemRunner};
pub use toolchain::{resolve_contexts, CommandSpec, ResolvedContexts, ToolchainContext, ToolchainRole};
