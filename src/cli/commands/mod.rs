//! Subcommand implementations.

mod bench;
mod config;
mod live;
mod tone;

pub use bench::cmd_bench;
pub use config::cmd_config;
pub use live::cmd_live;
pub use tone::cmd_tone;
