//! `crossbuild`: builds native dependencies and Rust applications for a
//! cross target and packages them for distribution.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let default_level = if cli.verbose { "crossbuild=debug" } else { "crossbuild=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout carries JSON events and command output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .init();

    let global = commands::Global {
        verbose: cli.verbose,
        color: !cli.no_color,
    };

    match cli.command {
        Commands::Build(args) => commands::build::execute(args, global),
        Commands::Plan(args) => commands::plan::execute(args, global),
        Commands::Toolchain(args) => commands::toolchain::execute(args, global),
        Commands::Cache(args) => commands::cache::execute(args, global),
    }
}
