//! wavviz - real-time audio visualization core.
//!
//! Captured audio goes in through a [`viz::CaptureHandle`]; once per video
//! frame [`viz::Visualizer::tick`] turns it into spectrum bars, level meters
//! or a waveform, and [`viz::Visualizer::render`] hands the result to a
//! renderer as pixel-space geometry.
//!
//! - [`viz`]: the signal pipeline and its settings
//! - [`host`]: capture sources (synthetic tone, system input device)
//! - [`config`]: TOML configuration file
//! - [`cli`]: command-line front end used by the `wavviz` binary

pub mod cli;
pub mod config;
pub mod error;
pub mod host;
#[cfg(test)]
pub mod test_utils;
pub mod viz;
