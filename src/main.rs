//! wavviz - audio visualization from the command line.
//!
//! Runs the visualization pipeline against a synthetic tone or the default
//! input device and prints the result to the terminal.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use wavviz::cli;

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging (stderr keeps stdout for frame output)
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("wavviz=info".parse()?))
        .init();

    cli::run_command(&args)
}
