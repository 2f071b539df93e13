//! Command-line interface for wavviz.
//!
//! Each subcommand lives in its own module under `commands`:
//! - `tone`: deterministic run against a synthetic sine
//! - `live`: capture from the default input device
//! - `bench`: per-tier DSP kernel timings
//! - `config`: inspect or initialize the config file

mod commands;
mod render;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{self, Config};
use crate::viz::settings::DisplayMode;

pub use render::{Glyphs, TextRenderer};

/// wavviz CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "WAVVIZ_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by the commands that draw frames.
#[derive(clap::Args, Debug, Clone)]
pub struct ViewArgs {
    /// Display mode (overrides the config file)
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,
    /// Layout width in pixels (overrides the config file)
    #[arg(long)]
    pub width: Option<u32>,
    /// Terminal columns to draw into
    #[arg(long, default_value = "80")]
    pub columns: usize,
    /// Terminal rows to draw into
    #[arg(long, default_value = "16")]
    pub rows: usize,
    /// Draw with plain ASCII instead of block characters
    #[arg(long)]
    pub ascii: bool,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Visualize a synthetic sine tone
    Tone {
        /// Tone frequency in Hz
        #[arg(short, long)]
        frequency: Option<f64>,
        /// Tone amplitude (0.0 - 1.0)
        #[arg(short, long)]
        amplitude: Option<f32>,
        /// Seconds of audio to process
        #[arg(short, long, default_value = "1.0")]
        seconds: f32,
        /// Print the final frame as JSON instead of drawing it
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Visualize the default input device
    Live {
        /// Seconds to run for
        #[arg(short, long, default_value = "10")]
        seconds: f32,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Time the DSP kernels of every available SIMD tier
    Bench {
        /// Samples per call
        #[arg(long, default_value = "4096")]
        block_size: usize,
        /// Calls per measurement
        #[arg(long, default_value = "500")]
        iterations: u32,
    },
    /// Show or initialize the config file
    Config {
        /// Write the default config if no file exists
        #[arg(long)]
        init: bool,
        /// Overwrite an existing file with defaults (with --init)
        #[arg(long)]
        force: bool,
        /// Print the effective config as TOML
        #[arg(long)]
        show: bool,
    },
}

/// Display modes selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Curve,
    Bar,
    SteppedBar,
    Meter,
    SteppedMeter,
    Waveform,
}

impl From<ModeArg> for DisplayMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Curve => DisplayMode::Curve,
            ModeArg::Bar => DisplayMode::Bar,
            ModeArg::SteppedBar => DisplayMode::SteppedBar,
            ModeArg::Meter => DisplayMode::Meter,
            ModeArg::SteppedMeter => DisplayMode::SteppedMeter,
            ModeArg::Waveform => DisplayMode::Waveform,
        }
    }
}

impl ViewArgs {
    /// Apply command-line overrides to a loaded config.
    fn apply(&self, config: &mut Config) {
        if let Some(mode) = self.mode {
            config.visualizer.display_mode = mode.into();
        }
        if let Some(width) = self.width {
            config.visualizer.width = width;
        }
    }

    fn renderer(&self) -> (TextRenderer, Glyphs) {
        let glyphs = if self.ascii {
            Glyphs::ASCII
        } else {
            Glyphs::BLOCKS
        };
        (TextRenderer::new(self.columns, self.rows), glyphs)
    }
}

/// Load the config named on the command line, or the default one.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    match &cli.config {
        Some(path) => Ok(config::load_from(path)?),
        None => Ok(config::load()),
    }
}

/// Run the parsed command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Tone {
            frequency,
            amplitude,
            seconds,
            json,
            view,
        } => {
            let mut config = load_config(cli)?;
            view.apply(&mut config);
            if let Some(f) = frequency {
                config.capture.tone_frequency = *f;
            }
            if let Some(a) = amplitude {
                config.capture.tone_amplitude = *a;
            }
            commands::cmd_tone(&config, *seconds, *json, view)
        }
        Commands::Live { seconds, view } => {
            let mut config = load_config(cli)?;
            view.apply(&mut config);
            commands::cmd_live(&config, *seconds, view)
        }
        Commands::Bench {
            block_size,
            iterations,
        } => commands::cmd_bench(*block_size, *iterations),
        Commands::Config { init, force, show } => {
            commands::cmd_config(cli.config.as_deref(), *init, *force, *show)
        }
    }
}
