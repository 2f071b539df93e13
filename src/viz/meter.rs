//! Peak / RMS level meter.

use super::simd::DspKernels;
use super::spectrum::dbfs;

/// One circular window per channel, `meter_ms` long.
#[derive(Debug, Clone)]
pub struct MeterEngine {
    windows: [Vec<f32>; 2],
    pos: [usize; 2],
    /// Smoothed level per channel in dBFS
    levels: [f32; 2],
}

impl MeterEngine {
    pub fn new(meter_ms: u32, sample_rate: u32, floor: f32) -> Self {
        let mut engine = Self {
            windows: [Vec::new(), Vec::new()],
            pos: [0; 2],
            levels: [floor; 2],
        };
        engine.configure(meter_ms, sample_rate, floor);
        engine
    }

    /// Window length in samples for a duration.
    pub fn window_samples(meter_ms: u32, sample_rate: u32) -> usize {
        ((u64::from(meter_ms) * u64::from(sample_rate) / 1000) as usize).max(1)
    }

    pub fn configure(&mut self, meter_ms: u32, sample_rate: u32, floor: f32) {
        let len = Self::window_samples(meter_ms, sample_rate);
        if self.windows[0].len() != len {
            for (window, pos) in self.windows.iter_mut().zip(&mut self.pos) {
                window.clear();
                window.resize(len, 0.0);
                *pos = 0;
            }
            self.levels = [floor; 2];
        }
    }

    pub fn window_len(&self) -> usize {
        self.windows[0].len()
    }

    /// Append newly captured samples to a channel's window.
    pub fn push(&mut self, channel: usize, fresh: &[f32]) {
        let window = &mut self.windows[channel];
        let cap = window.len();
        let fresh = &fresh[fresh.len().saturating_sub(cap)..];
        for &s in fresh {
            window[self.pos[channel]] = s;
            self.pos[channel] = (self.pos[channel] + 1) % cap;
        }
    }

    /// Level of a channel's window after gain, smoothed with `coefficient`.
    ///
    /// With `fast_peaks` a rising level is taken immediately and only the
    /// fall is smoothed.
    #[allow(clippy::too_many_arguments)]
    pub fn compute(
        &mut self,
        channel: usize,
        rms: bool,
        gain: f32,
        coefficient: f32,
        fast_peaks: bool,
        floor: f32,
        kernels: &dyn DspKernels,
    ) -> f32 {
        let window = &self.windows[channel];
        let raw = if rms {
            kernels.compute_rms(window)
        } else {
            kernels.peak(window)
        };
        let db = dbfs(raw * gain).max(floor);

        let prev = self.levels[channel].max(floor);
        let level = if fast_peaks && db >= prev {
            db
        } else {
            db + coefficient * (prev - db)
        };
        self.levels[channel] = level;
        level
    }

    pub fn reset(&mut self, floor: f32) {
        for (window, pos) in self.windows.iter_mut().zip(&mut self.pos) {
            window.fill(0.0);
            *pos = 0;
        }
        self.levels = [floor; 2];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viz::simd::select_kernels;

    #[test]
    fn test_window_length() {
        assert_eq!(MeterEngine::window_samples(100, 48000), 4800);
        assert_eq!(MeterEngine::window_samples(0, 48000), 1);
    }

    #[test]
    fn test_peak_and_rms() {
        let mut meter = MeterEngine::new(10, 1000, -60.0);
        meter.push(0, &[0.5, -0.5, 0.5, -0.5, 0.5, -0.5, 0.5, -0.5, 0.5, -1.0]);
        let peak = meter.compute(0, false, 1.0, 0.0, false, -60.0, select_kernels());
        assert!(peak.abs() < 1e-5);

        let mut meter = MeterEngine::new(10, 1000, -60.0);
        meter.push(0, &[0.5; 10]);
        let rms = meter.compute(0, true, 1.0, 0.0, false, -60.0, select_kernels());
        assert!((rms + 6.0206).abs() < 1e-3);
    }

    #[test]
    fn test_gain_is_applied() {
        let mut meter = MeterEngine::new(10, 1000, -60.0);
        meter.push(0, &[0.25; 10]);
        let level = meter.compute(0, false, 2.0, 0.0, false, -60.0, select_kernels());
        assert!((level + 6.0206).abs() < 1e-3);
    }

    #[test]
    fn test_silence_reads_floor() {
        let mut meter = MeterEngine::new(10, 1000, -60.0);
        meter.push(1, &[0.0; 25]);
        assert_eq!(meter.compute(1, true, 1.0, 0.5, false, -60.0, select_kernels()), -60.0);
    }

    #[test]
    fn test_fast_peaks_attack_instantly() {
        let kernels = select_kernels();
        let mut slow = MeterEngine::new(10, 1000, -60.0);
        let mut fast = MeterEngine::new(10, 1000, -60.0);
        slow.push(0, &[1.0; 10]);
        fast.push(0, &[1.0; 10]);

        let s = slow.compute(0, false, 1.0, 0.5, false, -60.0, kernels);
        let f = fast.compute(0, false, 1.0, 0.5, true, -60.0, kernels);
        assert!((s + 30.0).abs() < 1e-4);
        assert!(f.abs() < 1e-5);

        // Both decay the same way
        fast.push(0, &[0.0; 10]);
        let f = fast.compute(0, false, 1.0, 0.5, true, -60.0, kernels);
        assert!((f + 30.0).abs() < 1e-4);
    }

    #[test]
    fn test_window_keeps_most_recent() {
        let mut meter = MeterEngine::new(4, 1000, -60.0);
        meter.push(0, &[1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        let peak = meter.compute(0, false, 1.0, 0.0, false, -60.0, select_kernels());
        assert_eq!(peak, -60.0);
    }
}
