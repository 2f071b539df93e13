//! Deterministic tone source for offline runs and tests.

use parking_lot::Mutex;
use smallvec::SmallVec;
use std::f64::consts::TAU;
use std::sync::Arc;

use crate::viz::settings::CaptureTarget;
use crate::viz::{AudioFrame, CaptureHandle, CaptureHost};

/// Phase-continuous sine generator.
#[derive(Debug, Clone)]
pub struct ToneGenerator {
    frequency: f64,
    amplitude: f32,
    sample_rate: u32,
    index: u64,
}

impl ToneGenerator {
    pub fn new(frequency: f64, amplitude: f32, sample_rate: u32) -> Self {
        Self {
            frequency,
            amplitude,
            sample_rate,
            index: 0,
        }
    }

    pub fn set_tone(&mut self, frequency: f64, amplitude: f32) {
        self.frequency = frequency;
        self.amplitude = amplitude;
    }

    /// Fill `out` with the next samples.
    pub fn fill(&mut self, out: &mut [f32]) {
        let rate = f64::from(self.sample_rate.max(1));
        for s in out.iter_mut() {
            // Phase is computed from the absolute index to avoid drift
            let phase = (self.index as f64 * self.frequency / rate).fract() * TAU;
            *s = phase.sin() as f32 * self.amplitude;
            self.index += 1;
        }
    }
}

#[derive(Debug)]
struct Link {
    handle: Option<CaptureHandle>,
    target: CaptureTarget,
    available: bool,
    muted: bool,
    channels: usize,
    generator: ToneGenerator,
    connects: usize,
    disconnects: usize,
}

/// Controller for a synthetic source: generates audio and delivers it to
/// whichever visualizer is currently connected through its [`SyntheticHost`].
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    link: Arc<Mutex<Link>>,
}

impl SyntheticSource {
    pub fn new(sample_rate: u32, channels: usize, frequency: f64, amplitude: f32) -> Self {
        Self {
            link: Arc::new(Mutex::new(Link {
                handle: None,
                target: CaptureTarget::default(),
                available: true,
                muted: false,
                channels: channels.max(1),
                generator: ToneGenerator::new(frequency, amplitude, sample_rate),
                connects: 0,
                disconnects: 0,
            })),
        }
    }

    /// Host side to hand to a visualizer.
    pub fn host(&self) -> SyntheticHost {
        SyntheticHost {
            link: Arc::clone(&self.link),
        }
    }

    /// Whether connect attempts succeed.
    pub fn set_available(&self, available: bool) {
        self.link.lock().available = available;
    }

    pub fn set_tone(&self, frequency: f64, amplitude: f32) {
        self.link.lock().generator.set_tone(frequency, amplitude);
    }

    pub fn set_muted(&self, muted: bool) {
        self.link.lock().muted = muted;
    }

    pub fn connects(&self) -> usize {
        self.link.lock().connects
    }

    pub fn disconnects(&self) -> usize {
        self.link.lock().disconnects
    }

    pub fn is_connected(&self) -> bool {
        self.link.lock().handle.is_some()
    }

    /// Generate `frames` of audio starting at `timestamp_ns` and deliver
    /// them. Returns `false` when nothing is connected.
    pub fn pump(&self, frames: usize, timestamp_ns: u64) -> bool {
        let (handle, target, muted, planes) = {
            let mut link = self.link.lock();
            let Some(handle) = link.handle.clone() else {
                return false;
            };
            let mut mono = vec![0.0f32; frames];
            link.generator.fill(&mut mono);
            let planes = vec![mono; link.channels];
            (handle, link.target.clone(), link.muted, planes)
        };

        // Deliver outside the source lock: the callback takes the capture lock
        let slices: SmallVec<[&[f32]; 2]> = planes.iter().map(Vec::as_slice).collect();
        let frame = AudioFrame {
            planes: &slices,
            timestamp_ns,
        };
        match &target {
            CaptureTarget::Source { name } => handle.capture_audio(name, &frame, muted),
            CaptureTarget::OutputBus { mix } => handle.capture_output_bus(*mix, &frame),
        }
        true
    }
}

/// [`CaptureHost`] half of a [`SyntheticSource`].
#[derive(Debug)]
pub struct SyntheticHost {
    link: Arc<Mutex<Link>>,
}

impl CaptureHost for SyntheticHost {
    fn connect(&mut self, target: &CaptureTarget, handle: CaptureHandle) -> bool {
        let mut link = self.link.lock();
        link.connects += 1;
        if !link.available {
            return false;
        }
        link.target = target.clone();
        link.handle = Some(handle);
        true
    }

    fn disconnect(&mut self) {
        let mut link = self.link.lock();
        link.disconnects += 1;
        link.handle = None;
    }
}
