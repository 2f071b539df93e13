//! Test utilities and fixtures for wavviz tests.
//!
//! A [`Rig`] wires a [`Visualizer`] to a [`SyntheticSource`] and a
//! [`ManualClock`], so a test can feed audio and advance video frames in
//! lockstep without real time passing.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::tone_rig;
//!
//! let mut rig = tone_rig(Settings::default(), 1000.0, 0.5);
//! rig.run_ms(200, 10);      // 200 ms of audio, one tick every 10 ms
//! rig.tick_only_ms(600, 10); // callbacks stop, ticks continue
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::host::SyntheticSource;
use crate::viz::capture::ns_to_frames;
use crate::viz::{AudioInfo, Clock, DspKernels, ManualClock, Settings, Visualizer, simd};

/// Sample rate used by every rig.
pub const RIG_SAMPLE_RATE: u32 = 48000;

/// A shown visualizer fed by a synthetic tone.
pub struct Rig {
    pub viz: Visualizer,
    pub source: SyntheticSource,
    pub clock: Arc<ManualClock>,
}

/// Mono rig at 48 kHz using the best kernels for this CPU.
pub fn tone_rig(settings: Settings, frequency: f64, amplitude: f32) -> Rig {
    Rig::with_kernels(settings, frequency, amplitude, 1, simd::select_kernels())
}

impl Rig {
    /// Build and show a visualizer with `channels` identical input channels.
    pub fn with_kernels(
        settings: Settings,
        frequency: f64,
        amplitude: f32,
        channels: usize,
        kernels: &'static dyn DspKernels,
    ) -> Self {
        let clock = Arc::new(ManualClock::new());
        // Start away from zero so timestamp arithmetic never saturates
        clock.set_ns(1_000_000_000);
        let source = SyntheticSource::new(RIG_SAMPLE_RATE, channels, frequency, amplitude);
        let info = AudioInfo {
            sample_rate: RIG_SAMPLE_RATE,
            channels,
        };
        let mut viz = Visualizer::with_kernels(
            info,
            settings,
            Box::new(source.host()),
            clock.clone(),
            kernels,
        );
        viz.show();
        Self { viz, source, clock }
    }

    /// Deliver `chunk_ms` of audio then tick, repeated for `total_ms`.
    pub fn run_ms(&mut self, total_ms: u64, chunk_ms: u64) {
        let frames = ns_to_frames(chunk_ms * 1_000_000, RIG_SAMPLE_RATE);
        for _ in 0..total_ms / chunk_ms {
            self.source.pump(frames, self.clock.now_ns());
            self.advance_and_tick(chunk_ms);
        }
    }

    /// Tick without delivering audio, as when the source goes quiet.
    pub fn tick_only_ms(&mut self, total_ms: u64, chunk_ms: u64) {
        for _ in 0..total_ms / chunk_ms {
            self.advance_and_tick(chunk_ms);
        }
    }

    fn advance_and_tick(&mut self, chunk_ms: u64) {
        self.clock.advance(Duration::from_millis(chunk_ms));
        self.viz.tick(chunk_ms as f32 / 1000.0);
    }
}
