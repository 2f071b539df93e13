//! Audio host adapters implementing [`CaptureHost`](crate::viz::CaptureHost).
//!
//! - [`SyntheticHost`]: deterministic sine source driven by a manual clock
//! - [`CpalInputHost`]: the system default input device

mod cpal_input;
mod synthetic;

pub use cpal_input::CpalInputHost;
pub use synthetic::{SyntheticHost, SyntheticSource, ToneGenerator};
