//! FFT spectrum analysis.
//!
//! Turns the most recent `fft_size` samples of a channel into a dBFS value
//! per FFT bin:
//!
//! ```text
//! samples ──▶ × window × gain ──▶ real FFT ──▶ |bin| / Σwindow × roll-off ──▶ dBFS
//! ```
//!
//! Bar-level temporal smoothing ("gravity") also lives here, since it is
//! the last stage of the spectrum path after [`BinMapper`](super::bins::BinMapper).

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex32;
use std::sync::Arc;

use crate::error::Result;

use super::settings::{Settings, SmoothingMode};
use super::simd::DspKernels;
use super::window::WindowTable;

/// dBFS value substituted for non-positive magnitudes:
/// `20·log10(f32::MIN_POSITIVE)`.
pub const DB_MIN: f32 = -758.595_6;

/// Time constant used to scale the time-variant gravity slider.
/// Decaying bars this close to the floor land on it.
const FLOOR_SNAP_DB: f32 = 1e-3;
const GRAVITY_TIME_CONSTANT: f64 = 0.038_689_247_052_428_794;
/// Upper end of the gravity slider in seconds.
const GRAVITY_HI: f64 = 5.0 * GRAVITY_TIME_CONSTANT;

/// Convert a linear magnitude to dBFS.
#[inline]
pub fn dbfs(mag: f32) -> f32 {
    if mag > 0.0 {
        20.0 * mag.log10()
    } else {
        DB_MIN
    }
}

/// Convert dB to a linear factor.
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Smoothing coefficient for this frame, in `[0, 1]`.
///
/// Zero means "no smoothing". Time-variant mode derives the coefficient from
/// the frame duration so the decay speed does not depend on the frame rate.
pub fn gravity_coefficient(mode: SmoothingMode, gravity: f32, seconds: f32) -> f32 {
    if mode == SmoothingMode::None || gravity <= 0.0 {
        return 0.0;
    }
    let gravity = gravity.min(1.0);
    match mode {
        SmoothingMode::TimeVariant => {
            let tau = GRAVITY_HI * f64::from(gravity);
            (-f64::from(seconds.max(0.0)) / tau).exp() as f32
        }
        _ => gravity,
    }
}

/// Per-bin roll-off compensation multipliers.
///
/// Boosts high frequencies by `rate · log2(1 + (f/1kHz)^q) / q` dB. A rate
/// of zero yields all ones.
pub fn rolloff_table(fft_size: usize, sample_rate: u32, q: f32, rate: f32) -> Vec<f32> {
    let bins = fft_size / 2 + 1;
    if rate == 0.0 || sample_rate == 0 {
        return vec![1.0; bins];
    }
    let q = q.max(0.1);
    (0..bins)
        .map(|bin| {
            let freq = bin as f32 * sample_rate as f32 / fft_size as f32;
            let boost_db = rate * (1.0 + (freq / 1000.0).powf(q)).log2() / q;
            db_to_linear(boost_db)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RolloffKey {
    fft_size: usize,
    sample_rate: u32,
    q: f32,
    rate: f32,
}

/// FFT plan, window and per-channel working buffers.
pub struct SpectrumEngine {
    planner: RealFftPlanner<f32>,
    fft: Arc<dyn RealToComplex<f32>>,
    fft_size: usize,
    window: WindowTable,
    /// Windowed input, consumed by the transform
    input: Vec<f32>,
    output: Vec<Complex32>,
    scratch: Vec<Complex32>,
    rolloff: Vec<f32>,
    rolloff_key: RolloffKey,
    /// dBFS per FFT bin, per channel
    db: [Vec<f32>; 2],
    /// Previous smoothed bar values, per channel
    prev_bars: [Vec<f32>; 2],
}

impl std::fmt::Debug for SpectrumEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumEngine")
            .field("fft_size", &self.fft_size)
            .field("window", &self.window.function())
            .finish_non_exhaustive()
    }
}

impl SpectrumEngine {
    pub fn new(settings: &Settings, sample_rate: u32) -> Self {
        let fft_size = settings.effective_fft_size();
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let key = RolloffKey {
            fft_size,
            sample_rate,
            q: settings.rolloff_q,
            rate: settings.rolloff_rate,
        };

        let mut engine = Self {
            planner,
            fft,
            fft_size,
            window: WindowTable::new(settings.window, fft_size, settings.sine_exponent),
            input: Vec::new(),
            output: Vec::new(),
            scratch: Vec::new(),
            rolloff: rolloff_table(fft_size, sample_rate, key.q, key.rate),
            rolloff_key: key,
            db: [Vec::new(), Vec::new()],
            prev_bars: [Vec::new(), Vec::new()],
        };
        engine.resize_buffers();
        engine
    }

    /// Apply a settings snapshot. Rebuilds the plan, window and roll-off
    /// table only when their inputs changed.
    pub fn configure(&mut self, settings: &Settings, sample_rate: u32) {
        let fft_size = settings.effective_fft_size();

        if fft_size != self.fft_size {
            tracing::debug!("Rebuilding FFT plan: {} -> {}", self.fft_size, fft_size);
            self.fft = self.planner.plan_fft_forward(fft_size);
            self.fft_size = fft_size;
            self.resize_buffers();
        }

        if self
            .window
            .is_stale(settings.window, fft_size, settings.sine_exponent)
        {
            tracing::debug!("Rebuilding {:?} window ({} points)", settings.window, fft_size);
            self.window = WindowTable::new(settings.window, fft_size, settings.sine_exponent);
        }

        let key = RolloffKey {
            fft_size,
            sample_rate,
            q: settings.rolloff_q,
            rate: settings.rolloff_rate,
        };
        if key != self.rolloff_key {
            self.rolloff = rolloff_table(fft_size, sample_rate, key.q, key.rate);
            self.rolloff_key = key;
        }
    }

    fn resize_buffers(&mut self) {
        let bins = self.fft_size / 2 + 1;
        self.input = self.fft.make_input_vec();
        self.output = self.fft.make_output_vec();
        self.scratch = self.fft.make_scratch_vec();
        for db in &mut self.db {
            db.clear();
            db.resize(bins, DB_MIN);
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of FFT bins (`fft_size / 2 + 1`).
    pub fn bin_count(&self) -> usize {
        self.output.len()
    }

    pub fn window(&self) -> &WindowTable {
        &self.window
    }

    /// Analyze one channel. `samples` must hold exactly `fft_size` values.
    ///
    /// On FFT failure the channel's spectrum is set to silence and `false`
    /// is returned.
    pub fn analyze(
        &mut self,
        channel: usize,
        samples: &[f32],
        gain: f32,
        kernels: &dyn DspKernels,
    ) -> bool {
        debug_assert_eq!(samples.len(), self.fft_size);

        kernels.apply_window(samples, self.window.coefficients(), gain, &mut self.input);

        if let Err(e) = self.transform() {
            tracing::warn!("{}", e);
            self.db[channel].fill(DB_MIN);
            return false;
        }

        let scale = 1.0 / self.window.sum().max(f32::MIN_POSITIVE);
        kernels.compute_spectrum_step(&self.output, scale, &self.rolloff, &mut self.db[channel]);
        true
    }

    fn transform(&mut self) -> Result<()> {
        self.fft
            .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)?;
        Ok(())
    }

    /// Mark a channel silent without running the transform.
    pub fn silence(&mut self, channel: usize) {
        self.db[channel].fill(DB_MIN);
    }

    /// dBFS per FFT bin from the last [`analyze`](Self::analyze).
    pub fn spectrum_db(&self, channel: usize) -> &[f32] {
        &self.db[channel]
    }

    /// Blend bar values with the previous frame: `cur + g·(prev − cur)`.
    ///
    /// History starts at `floor` and is reset whenever the bar count changes.
    /// A decay that gets within rounding distance of the floor snaps onto it.
    pub fn smooth(&mut self, channel: usize, bars: &mut [f32], coefficient: f32, floor: f32) {
        let prev = &mut self.prev_bars[channel];
        if prev.len() != bars.len() {
            prev.clear();
            prev.resize(bars.len(), floor);
        }
        if coefficient > 0.0 {
            for (cur, p) in bars.iter_mut().zip(prev.iter()) {
                *cur += coefficient * (p - *cur);
                if *cur - floor < FLOOR_SNAP_DB {
                    *cur = floor;
                }
            }
        }
        prev.copy_from_slice(bars);
    }

    /// Forget smoothing history.
    pub fn reset_history(&mut self) {
        for prev in &mut self.prev_bars {
            prev.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viz::settings::WindowFunction;
    use crate::viz::simd::{baseline_kernels, select_kernels};

    fn settings_with_fft(size: usize) -> Settings {
        Settings {
            auto_fft_size: false,
            fft_size: size,
            ..Settings::default()
        }
    }

    #[test]
    fn test_dbfs_floor() {
        assert_eq!(dbfs(0.0), DB_MIN);
        assert_eq!(dbfs(-1.0), DB_MIN);
        assert!((dbfs(1.0)).abs() < 1e-6);
        assert!((dbfs(0.5) + 6.0206).abs() < 1e-3);
        assert!((DB_MIN - 20.0 * f32::MIN_POSITIVE.log10()).abs() < 1e-3);
    }

    #[test]
    fn test_gravity_modes() {
        assert_eq!(gravity_coefficient(SmoothingMode::None, 0.65, 0.016), 0.0);
        assert_eq!(gravity_coefficient(SmoothingMode::Exponential, 0.0, 0.016), 0.0);
        assert_eq!(gravity_coefficient(SmoothingMode::Exponential, 0.65, 0.016), 0.65);

        // Longer frames decay further
        let fast = gravity_coefficient(SmoothingMode::TimeVariant, 0.65, 1.0 / 144.0);
        let slow = gravity_coefficient(SmoothingMode::TimeVariant, 0.65, 1.0 / 30.0);
        assert!(fast > slow);
        assert!(slow > 0.0 && fast < 1.0);
    }

    #[test]
    fn test_time_variant_gravity_is_frame_rate_independent() {
        // Two 60 Hz frames decay as much as one 30 Hz frame
        let g60 = gravity_coefficient(SmoothingMode::TimeVariant, 0.5, 1.0 / 60.0);
        let g30 = gravity_coefficient(SmoothingMode::TimeVariant, 0.5, 1.0 / 30.0);
        assert!((g60 * g60 - g30).abs() < 1e-5);
    }

    #[test]
    fn test_rolloff_table() {
        let flat = rolloff_table(2048, 48000, 0.45, 0.0);
        assert_eq!(flat.len(), 1025);
        assert!(flat.iter().all(|&m| m == 1.0));

        let boosted = rolloff_table(2048, 48000, 0.45, 3.0);
        assert_eq!(boosted[0], 1.0);
        assert!(boosted.windows(2).all(|w| w[1] >= w[0]));
        assert!(boosted[1024] > 1.0);
    }

    #[test]
    fn test_resize_rebuilds_plan() {
        let mut engine = SpectrumEngine::new(&settings_with_fft(1024), 48000);
        assert_eq!(engine.bin_count(), 513);

        engine.configure(&settings_with_fft(4096), 48000);
        assert_eq!(engine.fft_size(), 4096);
        assert_eq!(engine.bin_count(), 2049);
        assert_eq!(engine.spectrum_db(0).len(), 2049);
        assert_eq!(engine.window().len(), 4096);

        let samples = vec![0.25f32; 4096];
        assert!(engine.analyze(0, &samples, 1.0, select_kernels()));
        assert_eq!(engine.spectrum_db(0).len(), 2049);
    }

    #[test]
    fn test_full_scale_sine_reads_half_amplitude() {
        // Exact bin 48 at 2048 points: |X| = A·Σw/2, so the peak sits at -6 dB
        let settings = Settings {
            window: WindowFunction::Hann,
            ..settings_with_fft(2048)
        };
        let mut engine = SpectrumEngine::new(&settings, 48000);
        let samples: Vec<f32> = (0..2048)
            .map(|i| (i as f32 / 48000.0 * 1125.0 * std::f32::consts::TAU).sin())
            .collect();
        assert!(engine.analyze(0, &samples, 1.0, baseline_kernels()));
        let db = engine.spectrum_db(0);
        assert!((db[48] + 6.02).abs() < 0.05, "peak {}", db[48]);
        assert!(db[200] < db[48] - 60.0);
    }

    #[test]
    fn test_silence_is_db_min() {
        let mut engine = SpectrumEngine::new(&settings_with_fft(1024), 48000);
        let samples = vec![0.0f32; 1024];
        assert!(engine.analyze(1, &samples, 1.0, select_kernels()));
        assert!(engine.spectrum_db(1).iter().all(|&v| v == DB_MIN));
    }

    #[test]
    fn test_smoothing() {
        let mut engine = SpectrumEngine::new(&Settings::default(), 48000);
        let mut bars = vec![0.0, -10.0];
        engine.smooth(0, &mut bars, 0.5, -60.0);
        assert_eq!(bars, vec![-30.0, -35.0]);

        let mut bars = vec![-60.0, -60.0];
        engine.smooth(0, &mut bars, 0.5, -60.0);
        assert_eq!(bars, vec![-45.0, -47.5]);

        // Zero coefficient passes through
        let mut bars = vec![-1.0, -2.0];
        engine.smooth(0, &mut bars, 0.0, -60.0);
        assert_eq!(bars, vec![-1.0, -2.0]);
        // A decay arriving at the floor settles there exactly
        let mut engine = SpectrumEngine::new(&Settings::default(), 48000);
        let mut bars = vec![-59.9995];
        engine.smooth(0, &mut bars, 0.5, -60.0);
        assert_eq!(bars, vec![-60.0]);
    }
}
