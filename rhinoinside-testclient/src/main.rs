//! # rhinoinside-testclient
//!
//! Diagnostic client for the `rhinoinside` crate. It runs discovery, path
//! normalization and assembly search against the real machine without
//! loading Rhino.
//!
//! ## Running
//!
//! ```bash
//! # Which installations are visible and which one would be used
//! cargo run --bin rhinoinside-testclient -- locate --latest
//!
//! # With debug logging
//! RUST_LOG=debug cargo run --bin rhinoinside-testclient -- search RhinoCommon
//! ```

mod app;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::app::{Cli, Command, GlobalOptions};

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.global);

    if let Err(e) = run(&cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Command::Locate { latest, min_major } => commands::locate(&cli.global, *latest, *min_major),
        Command::Normalize { path } => commands::normalize(&cli.global, path),
        Command::Search { module } => commands::search(&cli.global, module),
    }
}

// Logs go to stderr so --json output stays parseable; RUST_LOG overrides --verbose.
fn init_logging(opts: &GlobalOptions) {
    let default = if opts.verbose {
        "rhinoinside=debug,rhinoinside_testclient=debug"
    } else {
        "rhinoinside=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
