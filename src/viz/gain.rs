//! RMS-based automatic gain.
//!
//! The capture callback feeds mono audio into a one-second sliding window
//! and records `(audio end timestamp, rms)` pairs in a sync buffer. The tick
//! consumes the records up to the audio position it is about to display, so
//! the gain applied to a frame matches the loudness of that same audio.

use super::ring_buffer::RingBuffer;
use super::simd::DspKernels;
use super::spectrum::{db_to_linear, dbfs};

const RECORD_BYTES: usize = 12;
/// Oldest records are dropped beyond this many pending entries.
const MAX_PENDING_RECORDS: usize = 512;

/// Gain in dB needed to lift `rms_db` to `target_db`, never negative and
/// never above `max_gain`.
pub fn gain_db(rms_db: f32, target_db: f32, max_gain: f32) -> f32 {
    (target_db - rms_db).clamp(0.0, max_gain.max(0.0))
}

#[derive(Debug, Clone)]
pub struct GainNormalizer {
    enabled: bool,
    target_db: f32,
    max_gain: f32,
    /// Circular mono window, one second long
    window: Vec<f32>,
    pos: usize,
    filled: usize,
    /// Pending `(timestamp, rms)` records
    sync: RingBuffer,
    rms: f32,
    factor: f32,
}

impl GainNormalizer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            enabled: false,
            target_db: -3.0,
            max_gain: 30.0,
            window: vec![0.0; sample_rate.max(1) as usize],
            pos: 0,
            filled: 0,
            sync: RingBuffer::with_capacity(64 * RECORD_BYTES),
            rms: 0.0,
            factor: 1.0,
        }
    }

    pub fn configure(&mut self, enabled: bool, target_db: f32, max_gain: f32) {
        if enabled != self.enabled {
            tracing::debug!("Volume normalization {}", if enabled { "on" } else { "off" });
        }
        self.enabled = enabled;
        self.target_db = target_db;
        self.max_gain = max_gain.max(0.0);
        self.update_factor();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Add captured mono audio ending at `end_ts` (ns).
    pub fn push(&mut self, samples: &[f32], end_ts: u64, kernels: &dyn DspKernels) {
        if !self.enabled || samples.is_empty() {
            return;
        }

        let cap = self.window.len();
        let samples = &samples[samples.len().saturating_sub(cap)..];
        let first = samples.len().min(cap - self.pos);
        self.window[self.pos..self.pos + first].copy_from_slice(&samples[..first]);
        self.window[..samples.len() - first].copy_from_slice(&samples[first..]);
        self.pos = (self.pos + samples.len()) % cap;
        self.filled = (self.filled + samples.len()).min(cap);

        let rms = kernels.compute_rms(&self.window[..self.filled]);

        let mut record = [0u8; RECORD_BYTES];
        record[..8].copy_from_slice(&end_ts.to_ne_bytes());
        record[8..].copy_from_slice(&rms.to_ne_bytes());
        self.sync.push_back(&record);
        if self.sync.len() > MAX_PENDING_RECORDS * RECORD_BYTES {
            self.sync.drop_front(RECORD_BYTES);
        }
    }

    /// Adopt the newest RMS recorded at or before `ts` (ns).
    pub fn sync_to(&mut self, ts: i64) {
        let mut record = [0u8; RECORD_BYTES];
        while self.sync.len() >= RECORD_BYTES {
            self.sync.peek_front(&mut record);
            let mut ts_bytes = [0u8; 8];
            ts_bytes.copy_from_slice(&record[..8]);
            let record_ts = u64::from_ne_bytes(ts_bytes);
            if ts < 0 || record_ts > ts as u64 {
                break;
            }
            self.sync.drop_front(RECORD_BYTES);
            self.rms = f32::from_ne_bytes([record[8], record[9], record[10], record[11]]);
        }
        self.update_factor();
    }

    fn update_factor(&mut self) {
        self.factor = if self.enabled {
            db_to_linear(gain_db(dbfs(self.rms), self.target_db, self.max_gain))
        } else {
            1.0
        };
    }

    /// Multiplicative gain for the current frame; exactly 1 when disabled.
    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Current gain in dB.
    pub fn current_gain_db(&self) -> f32 {
        if self.enabled {
            gain_db(dbfs(self.rms), self.target_db, self.max_gain)
        } else {
            0.0
        }
    }

    /// RMS adopted by the last [`sync_to`](Self::sync_to).
    pub fn rms(&self) -> f32 {
        self.rms
    }

    /// Forget all history (used when capture is lost).
    pub fn reset(&mut self) {
        self.window.fill(0.0);
        self.pos = 0;
        self.filled = 0;
        self.sync.free();
        self.rms = 0.0;
        self.update_factor();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viz::simd::select_kernels;

    #[test]
    fn test_disabled_factor_is_exactly_one() {
        let mut gain = GainNormalizer::new(48000);
        gain.configure(false, -3.0, 30.0);
        gain.push(&[0.001; 480], 10_000_000, select_kernels());
        gain.sync_to(i64::MAX);
        assert_eq!(gain.factor(), 1.0);
        assert_eq!(gain.current_gain_db(), 0.0);
    }

    #[test]
    fn test_quiet_signal_is_boosted() {
        let mut gain = GainNormalizer::new(1000);
        gain.configure(true, -3.0, 30.0);
        // Constant 0.1 has an RMS of -20 dBFS, so 17 dB are needed
        gain.push(&[0.1; 1000], 1_000, select_kernels());
        gain.sync_to(1_000);
        assert!((gain.current_gain_db() - 17.0).abs() < 1e-3);
        assert!((gain.factor() - db_to_linear(17.0)).abs() < 1e-3);
    }

    #[test]
    fn test_loud_signal_is_never_attenuated() {
        let mut gain = GainNormalizer::new(1000);
        gain.configure(true, -20.0, 30.0);
        gain.push(&[0.9; 1000], 1_000, select_kernels());
        gain.sync_to(1_000);
        assert_eq!(gain.factor(), 1.0);
    }

    #[test]
    fn test_silence_hits_max_gain() {
        let mut gain = GainNormalizer::new(1000);
        gain.configure(true, -3.0, 12.0);
        gain.push(&[0.0; 100], 1_000, select_kernels());
        gain.sync_to(1_000);
        assert_eq!(gain.current_gain_db(), 12.0);
    }

    #[test]
    fn test_records_wait_for_their_timestamp() {
        let mut gain = GainNormalizer::new(100);
        gain.configure(true, 0.0, 60.0);
        gain.push(&[0.5; 100], 1_000, select_kernels());
        gain.push(&[0.05; 100], 2_000, select_kernels());

        gain.sync_to(500);
        assert_eq!(gain.rms(), 0.0);

        gain.sync_to(1_500);
        assert!((gain.rms() - 0.5).abs() < 1e-5);

        gain.sync_to(2_000);
        assert!((gain.rms() - 0.05).abs() < 1e-5);
    }

    #[test]
    fn test_window_wraps() {
        let mut gain = GainNormalizer::new(10);
        gain.configure(true, 0.0, 60.0);
        gain.push(&[1.0; 7], 1, select_kernels());
        gain.push(&[0.0; 7], 2, select_kernels());
        gain.sync_to(2);
        // Window holds 3 ones and 7 zeros
        assert!((gain.rms() - (0.3f32).sqrt()).abs() < 1e-5);
    }
}
