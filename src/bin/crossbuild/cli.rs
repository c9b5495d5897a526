//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crossbuild::ToolchainRole;

/// Crossbuild - cross-compile native dependencies and applications into
/// distributable packages
#[derive(Parser)]
#[command(name = "crossbuild")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build dependencies and applications, then package them
    Build(BuildArgs),

    /// Show the steps and applications a build would handle
    Plan(PlanArgs),

    /// Show the resolved host and target toolchains
    Toolchain(ToolchainArgs),

    /// Inspect or invalidate cached dependency builds
    Cache(CacheArgs),
}

/// Options shared by every command that reads a manifest.
#[derive(Args, Clone)]
pub struct ProjectArgs {
    /// Path to Crossbuild.toml (searched upward from the current directory)
    #[arg(long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    /// Target platform (overrides the manifest default)
    #[arg(long, short = 'p', env = "CROSSBUILD_PLATFORM")]
    pub platform: Option<String>,

    /// Root of install prefixes and work trees
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MessageFormat {
    Human,
    Json,
}

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Directory receiving the packages
    #[arg(long, short, default_value = "dist")]
    pub output: PathBuf,

    /// Debug build (debug features, no optimization)
    #[arg(long)]
    pub debug: bool,

    /// Parallel jobs passed to build systems
    #[arg(long, short)]
    pub jobs: Option<usize>,

    /// Output format for progress and results
    #[arg(long, value_enum, default_value = "human")]
    pub message_format: MessageFormat,
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ToolchainArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Print the contexts as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show the cache state of every dependency step
    Status(CacheStatusArgs),

    /// Invalidate a dependency so the next build reruns it
    Clean(CacheCleanArgs),
}

#[derive(Args)]
pub struct CacheStatusArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

#[derive(Args)]
pub struct CacheCleanArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Dependency id
    pub dependency: String,

    /// Only invalidate this context (host or target)
    #[arg(long)]
    pub role: Option<ToolchainRole>,
}
