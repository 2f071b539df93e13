//! Time-domain waveform history.

use super::ring_buffer::RingBuffer;

/// Bounded raw-sample history per channel, oldest samples first.
#[derive(Debug, Clone, Default)]
pub struct WaveformEngine {
    buffers: [RingBuffer; 2],
    max_samples: usize,
}

impl WaveformEngine {
    pub fn new(waveform_ms: u32, sample_rate: u32) -> Self {
        let mut engine = Self::default();
        engine.configure(waveform_ms, sample_rate);
        engine
    }

    /// History length in samples for a duration.
    pub fn waveform_samples(waveform_ms: u32, sample_rate: u32) -> usize {
        ((u64::from(waveform_ms) * u64::from(sample_rate) / 1000) as usize).max(1)
    }

    pub fn configure(&mut self, waveform_ms: u32, sample_rate: u32) {
        let max = Self::waveform_samples(waveform_ms, sample_rate);
        if max != self.max_samples {
            self.max_samples = max;
            for buf in &mut self.buffers {
                buf.truncate_front_samples(max);
            }
        }
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    /// Append newly captured samples, discarding the oldest beyond the bound.
    pub fn push(&mut self, channel: usize, fresh: &[f32]) {
        let fresh = &fresh[fresh.len().saturating_sub(self.max_samples)..];
        let buf = &mut self.buffers[channel];
        buf.push_back_samples(fresh);
        buf.truncate_front_samples(self.max_samples);
    }

    /// The raw history of a channel.
    pub fn buffer(&self, channel: usize) -> &RingBuffer {
        &self.buffers[channel]
    }

    /// Copy a channel's history into `out`, left-padded with silence until
    /// the history is full.
    pub fn snapshot(&self, channel: usize, out: &mut Vec<f32>) {
        let buf = &self.buffers[channel];
        let stored = buf.sample_len().min(self.max_samples);
        out.clear();
        out.resize(self.max_samples, 0.0);
        buf.peek_back_samples(&mut out[self.max_samples - stored..]);
    }

    pub fn reset(&mut self) {
        for buf in &mut self.buffers {
            buf.free();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_history() {
        let mut wave = WaveformEngine::new(5, 1000);
        assert_eq!(wave.max_samples(), 5);

        wave.push(0, &[1.0, 2.0, 3.0]);
        wave.push(0, &[4.0, 5.0, 6.0, 7.0]);
        let mut out = Vec::new();
        wave.snapshot(0, &mut out);
        assert_eq!(out, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(wave.buffer(0).sample_len(), 5);
    }

    #[test]
    fn test_snapshot_pads_until_full() {
        let mut wave = WaveformEngine::new(4, 1000);
        wave.push(1, &[0.5, -0.5]);
        let mut out = Vec::new();
        wave.snapshot(1, &mut out);
        assert_eq!(out, vec![0.0, 0.0, 0.5, -0.5]);
    }

    #[test]
    fn test_shrinking_keeps_newest() {
        let mut wave = WaveformEngine::new(10, 1000);
        wave.push(0, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        wave.configure(3, 1000);
        let mut out = Vec::new();
        wave.snapshot(0, &mut out);
        assert_eq!(out, vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_oversized_push() {
        let mut wave = WaveformEngine::new(3, 1000);
        wave.push(0, &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let mut out = Vec::new();
        wave.snapshot(0, &mut out);
        assert_eq!(out, vec![3.0, 4.0, 5.0]);
    }
}
