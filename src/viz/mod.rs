//! Real-time audio visualization pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Host capture callback (any thread)              │
//! │     deinterleave / downmix · mute → silence · gain window       │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ CaptureHandle (re-entrant timed lock)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          CaptureState                           │
//! │   ring buffer per channel · timestamps · loss detection/retry   │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ Visualizer::tick (once per video frame)
//!            ┌─────────────────┼──────────────────┐
//!            ▼                 ▼                  ▼
//!     SpectrumEngine      MeterEngine       WaveformEngine
//!       + BinMapper            │                  │
//!            └─────────────────┼──────────────────┘
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │     VisualFrame → layout::build → RenderTarget::draw (render)   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The hot per-sample loops run through a [`DspKernels`] tier picked once
//! from the CPU's capabilities (see [`simd`]).

pub mod bins;
pub mod capture;
pub mod gain;
pub mod layout;
pub mod meter;
pub mod ring_buffer;
pub mod settings;
pub mod simd;
pub mod spectrum;
pub mod waveform;
pub mod window;

pub use capture::{
    AudioFrame, CaptureHandle, CaptureHost, CaptureState, Clock, LinkStatus, ManualClock,
    SystemClock,
};
pub use layout::{Geometry, Primitive};
pub use settings::Settings;
pub use simd::{DspKernels, SimdLevel};

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use bins::BinMapper;
use capture::{LinkAction, ns_to_frames};
use meter::MeterEngine;
use spectrum::{SpectrumEngine, gravity_coefficient};
use waveform::WaveformEngine;

/// How long a tick waits for the capture lock before skipping the frame.
const TICK_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// Format of the captured stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: usize,
}

/// What a [`VisualFrame`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// dBFS per bar
    Spectrum,
    /// One dBFS level per channel
    Meter,
    /// Raw samples in `[-1, 1]`
    Waveform,
}

/// Output of the last tick, consumed by [`Visualizer::render`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualFrame {
    pub kind: FrameKind,
    /// Per output channel: bar values, a single meter level, or waveform
    /// points mapped onto the display width
    pub channels: Vec<Vec<f32>>,
    /// Full waveform history per channel (waveform mode only)
    pub waveform: Vec<Vec<f32>>,
    pub floor: f32,
    pub ceiling: f32,
    /// Every value sits at the floor (or every sample is zero)
    pub silent: bool,
    pub link: LinkStatus,
    /// Volume normalization gain applied to this frame
    pub gain_db: f32,
}

impl VisualFrame {
    fn empty(floor: f32, ceiling: f32) -> Self {
        Self {
            kind: FrameKind::Spectrum,
            channels: Vec::new(),
            waveform: Vec::new(),
            floor,
            ceiling,
            silent: true,
            link: LinkStatus::Hidden,
            gain_db: 0.0,
        }
    }

    /// Map a dBFS value into `[0, 1]` between floor and ceiling.
    pub fn normalized(&self, db: f32) -> f32 {
        ((db - self.floor) / (self.ceiling - self.floor)).clamp(0.0, 1.0)
    }
}

/// Consumer of computed frames, typically a GPU-backed drawing surface.
pub trait RenderTarget {
    /// Renderer-specific handle (shader, effect, style).
    type Effect;

    fn draw(&mut self, effect: &Self::Effect, frame: &VisualFrame, geometry: &Geometry);
}

/// One visualizer instance: owns its capture state and whole pipeline.
pub struct Visualizer {
    info: AudioInfo,
    settings: Settings,
    kernels: &'static dyn DspKernels,
    clock: Arc<dyn Clock>,
    handle: CaptureHandle,
    host: Box<dyn CaptureHost>,
    spectrum: SpectrumEngine,
    bins: BinMapper,
    meter: MeterEngine,
    waveform: WaveformEngine,
    /// Analysis window per channel, refilled each tick
    analysis: [Vec<f32>; 2],
    frame: VisualFrame,
    visible: bool,
}

impl std::fmt::Debug for Visualizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Visualizer")
            .field("info", &self.info)
            .field("kernels", &self.kernels.level())
            .field("spectrum", &self.spectrum)
            .field("visible", &self.visible)
            .finish_non_exhaustive()
    }
}

impl Visualizer {
    /// Create a hidden visualizer using the best kernels for this CPU.
    pub fn new(
        info: AudioInfo,
        settings: Settings,
        host: Box<dyn CaptureHost>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_kernels(info, settings, host, clock, simd::select_kernels())
    }

    /// Create a hidden visualizer with an explicit kernel tier.
    pub fn with_kernels(
        info: AudioInfo,
        settings: Settings,
        host: Box<dyn CaptureHost>,
        clock: Arc<dyn Clock>,
        kernels: &'static dyn DspKernels,
    ) -> Self {
        tracing::info!(
            "Visualizer: {} Hz, {} channel(s), {} kernels",
            info.sample_rate,
            info.channels,
            kernels.level().name()
        );

        let sr = info.sample_rate;
        let spectrum = SpectrumEngine::new(&settings, sr);
        let bins = BinMapper::new(&settings, spectrum.fft_size(), sr);
        let (floor, ceiling) = settings.db_range();
        let state = CaptureState::new(sr, info.channels);

        let mut viz = Self {
            info,
            meter: MeterEngine::new(settings.meter_ms, sr, floor),
            waveform: WaveformEngine::new(settings.waveform_ms, sr),
            handle: CaptureHandle::new(state, Arc::clone(&clock), kernels),
            settings: Settings::default(),
            kernels,
            clock,
            host,
            spectrum,
            bins,
            analysis: [Vec::new(), Vec::new()],
            frame: VisualFrame::empty(floor, ceiling),
            visible: false,
        };
        viz.apply(settings);
        viz
    }

    /// Apply a settings snapshot. Tables depending on FFT size, bar count or
    /// window family are rebuilt before this returns.
    pub fn update(&mut self, settings: Settings) {
        let retarget = settings.capture != self.settings.capture;
        self.apply(settings);
        if retarget && self.visible {
            tracing::info!("Capture target changed to {:?}", self.settings.capture);
            self.release();
            self.connect();
        }
    }

    fn apply(&mut self, settings: Settings) {
        let sr = self.info.sample_rate;
        let (floor, _) = settings.db_range();
        self.settings = settings;
        let s = &self.settings;

        self.spectrum.configure(s, sr);
        self.bins.configure(s, self.spectrum.fft_size(), sr);
        self.meter.configure(s.meter_ms, sr, floor);
        self.waveform.configure(s.waveform_ms, sr);

        let window = self.analysis_window();
        for buf in &mut self.analysis {
            buf.clear();
            buf.resize(window, 0.0);
        }

        let s = &self.settings;
        if self
            .handle
            .with_state(TICK_LOCK_TIMEOUT, |state| state.configure(s, window))
            .is_none()
        {
            tracing::warn!("Capture state busy, settings apply on the next update");
        }
        self.silence_frame(self.frame.link);
    }

    /// Samples read from capture per tick for the current display mode.
    fn analysis_window(&self) -> usize {
        match self.settings.display_mode {
            m if m.is_meter() => self.meter.window_len(),
            settings::DisplayMode::Waveform => self.waveform.max_samples(),
            _ => self.spectrum.fft_size(),
        }
    }

    /// Connect audio capture and start processing.
    pub fn show(&mut self) {
        if self.visible {
            return;
        }
        self.visible = true;
        self.connect();
    }

    /// Disconnect audio capture. Hidden instances process no audio.
    pub fn hide(&mut self) {
        if !self.visible {
            return;
        }
        self.visible = false;
        self.release();
        self.handle
            .with_state(TICK_LOCK_TIMEOUT, |state| state.on_hidden());
        self.reset_history();
        self.silence_frame(LinkStatus::Hidden);
    }

    fn connect(&mut self) {
        let now = self.clock.now_ns();
        // Connected before subscribing so the first callbacks are kept
        self.handle
            .with_state(TICK_LOCK_TIMEOUT, |state| state.on_connected(now));
        if self.host.connect(&self.settings.capture, self.handle.clone()) {
            tracing::info!("Capturing {:?}", self.settings.capture);
        } else {
            tracing::warn!(
                "Capture source {:?} unavailable, retrying every {}s",
                self.settings.capture,
                capture::RETRY_DELAY_SECS
            );
            self.handle
                .with_state(TICK_LOCK_TIMEOUT, |state| state.on_connect_failed());
        }
    }

    /// Unsubscribe while holding the capture lock. A callback delivered
    /// synchronously during teardown re-enters the lock on this thread.
    fn release(&mut self) {
        let _guard = self.handle.lock(TICK_LOCK_TIMEOUT);
        self.host.disconnect();
    }

    /// Advance one video frame: check the link, drain captured audio and
    /// recompute the output for the current display mode.
    pub fn tick(&mut self, seconds: f32) {
        if !self.visible {
            return;
        }
        let now = self.clock.now_ns();
        let sr = self.info.sample_rate;

        let Some(guard) = self.handle.lock(TICK_LOCK_TIMEOUT) else {
            tracing::warn!("Capture state busy, skipping tick");
            return;
        };

        let action = guard.borrow_mut().check_link(now, seconds);
        match action {
            LinkAction::Release => {
                tracing::info!(
                    "Capture source lost, retrying every {}s",
                    capture::RETRY_DELAY_SECS
                );
                self.host.disconnect();
            }
            LinkAction::Recapture => {
                let attempt = {
                    let mut state = guard.borrow_mut();
                    state.on_connected(now);
                    state.retries()
                };
                tracing::info!("Recapturing audio (attempt {})", attempt);
                if !self.host.connect(&self.settings.capture, self.handle.clone()) {
                    guard.borrow_mut().on_connect_failed();
                }
            }
            LinkAction::None => {}
        }

        let mut state = guard.borrow_mut();
        let link = state.link();
        if link != LinkStatus::Connected {
            drop(state);
            drop(guard);
            self.reset_history();
            self.silence_frame(link);
            return;
        }

        let delay = ns_to_frames(state.get_audio_sync(now).max(0) as u64, sr);
        let channels = state.output_channels();
        let displayed_ts = now as i64 - state.ts_offset();
        state.gain_mut().sync_to(displayed_ts);
        let gain = state.gain().factor();
        let gain_db = state.gain().current_gain_db();

        let mut fresh = [None; 2];
        for (ch, f) in fresh.iter_mut().enumerate().take(channels) {
            *f = state.drain(ch, delay, &mut self.analysis[ch]);
        }
        drop(state);
        drop(guard);

        self.process(channels, fresh, gain, seconds);
        self.frame.link = link;
        self.frame.gain_db = gain_db;
    }

    fn process(&mut self, channels: usize, fresh: [Option<usize>; 2], gain: f32, seconds: f32) {
        let (floor, ceiling) = self.settings.db_range();
        let s = &self.settings;
        let coefficient = gravity_coefficient(s.smoothing, s.gravity, seconds);
        let frame = &mut self.frame;
        frame.floor = floor;
        frame.ceiling = ceiling;
        frame.channels.resize_with(channels, Vec::new);

        match s.display_mode {
            mode if mode.is_meter() => {
                frame.kind = FrameKind::Meter;
                frame.waveform.clear();
                for ch in 0..channels {
                    if let Some(n) = fresh[ch] {
                        let window = &self.analysis[ch];
                        self.meter.push(ch, &window[window.len() - n..]);
                    }
                    let level = self.meter.compute(
                        ch,
                        s.meter_rms,
                        gain,
                        coefficient,
                        s.fast_peaks,
                        floor,
                        self.kernels,
                    );
                    frame.channels[ch].clear();
                    frame.channels[ch].push(level);
                }
                frame.silent = frame.channels.iter().flatten().all(|&v| v <= floor);
            }
            settings::DisplayMode::Waveform => {
                frame.kind = FrameKind::Waveform;
                frame.waveform.resize_with(channels, Vec::new);
                for ch in 0..channels {
                    if let Some(n) = fresh[ch] {
                        let window = &self.analysis[ch];
                        self.waveform.push(ch, &window[window.len() - n..]);
                    }
                    self.waveform.snapshot(ch, &mut frame.waveform[ch]);
                    self.bins.map_linear(&frame.waveform[ch], &mut frame.channels[ch]);
                }
                frame.silent = frame.waveform.iter().flatten().all(|&v| v == 0.0);
            }
            _ => {
                frame.kind = FrameKind::Spectrum;
                frame.waveform.clear();
                for ch in 0..channels {
                    if fresh[ch].is_some() {
                        self.spectrum
                            .analyze(ch, &self.analysis[ch], gain, self.kernels);
                    } else {
                        self.spectrum.silence(ch);
                    }

                    let bars = &mut frame.channels[ch];
                    bars.clear();
                    bars.extend_from_slice(
                        self.bins.map(ch, self.spectrum.spectrum_db(ch), floor),
                    );
                    self.spectrum.smooth(ch, bars, coefficient, floor);
                    for v in bars.iter_mut() {
                        *v = v.clamp(floor, ceiling);
                    }
                }
                frame.silent = frame.channels.iter().flatten().all(|&v| v <= floor);
            }
        }
    }

    /// Drop smoothing state and meter/waveform history.
    fn reset_history(&mut self) {
        let (floor, _) = self.settings.db_range();
        self.spectrum.reset_history();
        self.meter.reset(floor);
        self.waveform.reset();
    }

    /// Flat output: used while hidden, lost, or waiting for audio.
    fn silence_frame(&mut self, link: LinkStatus) {
        let (floor, ceiling) = self.settings.db_range();
        let channels = self
            .handle
            .with_state(TICK_LOCK_TIMEOUT, |state| state.output_channels())
            .unwrap_or(1);
        let s = &self.settings;
        let frame = &mut self.frame;
        frame.floor = floor;
        frame.ceiling = ceiling;
        frame.link = link;
        frame.silent = true;
        frame.gain_db = 0.0;

        let (kind, width, value) = match s.display_mode {
            m if m.is_meter() => (FrameKind::Meter, 1, floor),
            settings::DisplayMode::Waveform => (FrameKind::Waveform, s.num_bars(), 0.0),
            _ => (FrameKind::Spectrum, self.bins.num_bars(), floor),
        };
        frame.kind = kind;
        frame.channels.resize_with(channels, Vec::new);
        for values in &mut frame.channels {
            values.clear();
            values.resize(width, value);
        }
        frame.waveform.clear();
        if kind == FrameKind::Waveform {
            frame
                .waveform
                .resize(channels, vec![0.0; self.waveform.max_samples()]);
        }
    }

    /// Hand the latest frame to the renderer. Returns `false` when nothing
    /// was drawn (hidden, or silent with `hide_on_silent`).
    pub fn render<T: RenderTarget>(&self, target: &mut T, effect: &T::Effect) -> bool {
        if !self.visible || (self.frame.silent && self.settings.hide_on_silent) {
            return false;
        }
        let geometry = layout::build(&self.settings, &self.frame);
        target.draw(effect, &self.frame, &geometry);
        true
    }

    /// Output of the last tick.
    pub fn frame(&self) -> &VisualFrame {
        &self.frame
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn info(&self) -> AudioInfo {
        self.info
    }

    pub fn kernels(&self) -> &'static dyn DspKernels {
        self.kernels
    }

    /// Handle for host callbacks.
    pub fn handle(&self) -> &CaptureHandle {
        &self.handle
    }

    pub fn bins(&self) -> &BinMapper {
        &self.bins
    }

    pub fn fft_size(&self) -> usize {
        self.spectrum.fft_size()
    }

    /// Number of FFT bins in the current spectrum.
    pub fn bin_count(&self) -> usize {
        self.spectrum.bin_count()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn link_status(&self) -> LinkStatus {
        self.handle
            .with_state(TICK_LOCK_TIMEOUT, |state| state.link())
            .unwrap_or(self.frame.link)
    }

    /// Recapture attempts since the last [`show`](Self::show).
    pub fn retries(&self) -> u32 {
        self.handle
            .with_state(TICK_LOCK_TIMEOUT, |state| state.retries())
            .unwrap_or(0)
    }
}

impl Drop for Visualizer {
    fn drop(&mut self) {
        if self.visible {
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Rig, tone_rig};
    use settings::{ChannelMode, DisplayMode, FilterMode, SmoothingMode, WindowFunction};

    /// 1 kHz scenario: 60 bars over 779 px, 2048-point Hann FFT, log axis.
    fn spectrum_settings() -> Settings {
        Settings {
            display_mode: DisplayMode::Bar,
            width: 779,
            bar_width: 12,
            bar_gap: 1,
            window: WindowFunction::Hann,
            log_scale: true,
            filter_mode: FilterMode::None,
            smoothing: SmoothingMode::None,
            ..Settings::default()
        }
    }

    fn argmax(values: &[f32]) -> usize {
        values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn test_tone_peaks_at_its_bar() {
        let mut rig = tone_rig(spectrum_settings(), 1000.0, 0.5);
        assert_eq!(rig.viz.fft_size(), 2048);
        rig.run_ms(200, 10);

        let frame = rig.viz.frame();
        assert_eq!(frame.kind, FrameKind::Spectrum);
        assert_eq!(frame.channels.len(), 1);
        let bars = &frame.channels[0];
        assert_eq!(bars.len(), 60);
        assert!(!frame.silent);

        let expected = rig.viz.bins().bar_for_frequency(1000.0).unwrap();
        assert_eq!(argmax(bars), expected);
    }

    #[test]
    fn test_every_tier_finds_the_same_peak() {
        for kernels in simd::available_tiers() {
            let mut rig = Rig::with_kernels(spectrum_settings(), 1000.0, 0.5, 1, kernels);
            rig.run_ms(100, 10);
            let expected = rig.viz.bins().bar_for_frequency(1000.0).unwrap();
            assert_eq!(argmax(&rig.viz.frame().channels[0]), expected, "{:?}", kernels);
        }
    }

    #[test]
    fn test_silence_reaches_floor() {
        let mut rig = tone_rig(spectrum_settings(), 1000.0, 0.5);
        rig.run_ms(100, 10);
        rig.source.set_tone(1000.0, 0.0);
        rig.run_ms(600, 10);

        let frame = rig.viz.frame();
        assert_eq!(frame.link, LinkStatus::Connected);
        assert!(frame.channels[0].iter().all(|&v| v == -65.0));
        assert!(frame.silent);
    }

    /// 60-bar layout with everything else at its defaults: Lanczos taps,
    /// Gaussian filter mode, exponential smoothing and an auto FFT size.
    fn default_pipeline_settings() -> Settings {
        Settings {
            display_mode: DisplayMode::Bar,
            width: 779,
            bar_width: 12,
            bar_gap: 1,
            ..Settings::default()
        }
    }

    #[test]
    fn test_default_pipeline_reports_tone_level() {
        let mut rig = tone_rig(default_pipeline_settings(), 1000.0, 0.5);
        assert_eq!(rig.viz.fft_size(), 2048);
        rig.run_ms(600, 10);

        let bars = &rig.viz.frame().channels[0];
        let peak = argmax(bars);
        assert_eq!(peak, rig.viz.bins().bar_for_frequency(1000.0).unwrap());
        // Half-scale sine is -12 dBFS, less a little Hann scalloping
        assert!((-13.0..-11.5).contains(&bars[peak]), "peak {}", bars[peak]);
    }

    #[test]
    fn test_slope_and_filter_keep_tone_peak() {
        let settings = Settings {
            slope: 1.0,
            filter_radius: 1.5,
            ..default_pipeline_settings()
        };
        let mut rig = tone_rig(settings, 1000.0, 0.5);
        rig.run_ms(600, 10);

        let bars = &rig.viz.frame().channels[0];
        let peak = argmax(bars);
        assert_eq!(peak, rig.viz.bins().bar_for_frequency(1000.0).unwrap());
        let lifted = -12.04 + rig.viz.bins().slope_db()[peak];
        assert!(bars[peak] < lifted, "peak {}", bars[peak]);
        assert!(bars[peak] > -45.0, "peak {}", bars[peak]);
    }

    #[test]
    fn test_silence_with_slope_and_filter_stays_at_floor() {
        let settings = Settings {
            slope: 1.0,
            filter_radius: 1.5,
            hide_on_silent: true,
            ..default_pipeline_settings()
        };
        let mut rig = tone_rig(settings, 1000.0, 0.0);
        rig.run_ms(600, 10);

        let frame = rig.viz.frame();
        assert_eq!(frame.link, LinkStatus::Connected);
        assert!(frame.channels[0].iter().all(|&v| v == -65.0), "{:?}", frame.channels[0]);
        assert!(frame.silent);

        struct Never;
        impl RenderTarget for Never {
            type Effect = ();
            fn draw(&mut self, _: &(), _: &VisualFrame, _: &Geometry) {
                panic!("silent frame drawn");
            }
        }
        assert!(!rig.viz.render(&mut Never, &()));
    }

    #[test]
    fn test_smoothed_bars_settle_after_tone_stops() {
        let settings = Settings {
            filter_radius: 1.5,
            ..default_pipeline_settings()
        };
        let mut rig = tone_rig(settings, 1000.0, 0.5);
        rig.run_ms(300, 10);
        assert!(!rig.viz.frame().silent);

        rig.source.set_tone(1000.0, 0.0);
        rig.run_ms(600, 10);
        let frame = rig.viz.frame();
        assert!(frame.channels[0].iter().all(|&v| v == -65.0), "{:?}", frame.channels[0]);
        assert!(frame.silent);
    }

    #[test]
    fn test_capture_loss_and_single_retry() {
        let mut rig = tone_rig(spectrum_settings(), 1000.0, 0.5);
        rig.run_ms(100, 10);
        assert_eq!(rig.source.connects(), 1);

        // Callbacks stop; ticks continue
        rig.tick_only_ms(490, 10);
        assert_eq!(rig.viz.link_status(), LinkStatus::Connected);
        rig.tick_only_ms(30, 10);
        assert_eq!(rig.viz.link_status(), LinkStatus::Lost);
        assert_eq!(rig.source.disconnects(), 1);
        assert!(rig.viz.frame().silent);
        assert_eq!(
            rig.viz
                .handle()
                .with_state(Duration::from_millis(10), |s| s.buffered_frames(0)),
            Some(0)
        );

        rig.tick_only_ms(1950, 10);
        assert_eq!(rig.source.connects(), 1);
        rig.tick_only_ms(150, 10);
        assert_eq!(rig.source.connects(), 2);
        assert_eq!(rig.viz.retries(), 1);
        assert_eq!(rig.viz.link_status(), LinkStatus::Connected);
    }

    #[test]
    fn test_unavailable_source_keeps_retrying() {
        let mut rig = tone_rig(spectrum_settings(), 1000.0, 0.5);
        rig.viz.hide();
        rig.source.set_available(false);
        rig.viz.show();
        assert_eq!(rig.viz.link_status(), LinkStatus::Lost);

        rig.tick_only_ms(4100, 10);
        assert_eq!(rig.source.connects(), 4);
    }

    #[test]
    fn test_output_bus_survives_gaps() {
        let settings = Settings {
            capture: settings::CaptureTarget::OutputBus { mix: 2 },
            ..spectrum_settings()
        };
        let mut rig = tone_rig(settings, 1000.0, 0.5);
        rig.run_ms(100, 10);
        rig.tick_only_ms(3000, 10);
        assert_eq!(rig.viz.link_status(), LinkStatus::Connected);
        assert_eq!(rig.source.connects(), 1);
    }

    #[test]
    fn test_hidden_instance_processes_nothing() {
        let mut rig = tone_rig(spectrum_settings(), 1000.0, 0.5);
        rig.viz.hide();
        assert_eq!(rig.source.disconnects(), 1);
        rig.run_ms(100, 10);
        assert_eq!(rig.viz.link_status(), LinkStatus::Hidden);
        assert!(rig.viz.frame().silent);

        struct Counter(usize);
        impl RenderTarget for Counter {
            type Effect = ();
            fn draw(&mut self, _: &(), _: &VisualFrame, _: &Geometry) {
                self.0 += 1;
            }
        }
        let mut counter = Counter(0);
        assert!(!rig.viz.render(&mut counter, &()));
        assert_eq!(counter.0, 0);
    }

    #[test]
    fn test_hide_on_silent_skips_render() {
        struct Counter(usize);
        impl RenderTarget for Counter {
            type Effect = ();
            fn draw(&mut self, _: &(), _: &VisualFrame, _: &Geometry) {
                self.0 += 1;
            }
        }

        let settings = Settings {
            hide_on_silent: true,
            ..spectrum_settings()
        };
        let mut rig = tone_rig(settings, 1000.0, 0.0);
        rig.run_ms(100, 10);
        let mut counter = Counter(0);
        assert!(!rig.viz.render(&mut counter, &()));

        rig.source.set_tone(1000.0, 0.5);
        rig.run_ms(100, 10);
        assert!(rig.viz.render(&mut counter, &()));
        assert_eq!(counter.0, 1);
    }

    #[test]
    fn test_update_rebuilds_tables() {
        let mut rig = tone_rig(spectrum_settings(), 1000.0, 0.5);
        assert_eq!(rig.viz.bin_count(), 1025);

        rig.viz.update(Settings {
            auto_fft_size: false,
            fft_size: 4100,
            width: 400,
            ..spectrum_settings()
        });
        assert_eq!(rig.viz.fft_size(), 4096);
        assert_eq!(rig.viz.bin_count(), 2049);
        rig.run_ms(150, 10);
        assert_eq!(rig.viz.frame().channels[0].len(), 30);
    }

    #[test]
    fn test_meter_mode() {
        let settings = Settings {
            display_mode: DisplayMode::Meter,
            smoothing: SmoothingMode::None,
            ..Settings::default()
        };
        let mut rig = tone_rig(settings, 1000.0, 0.5);
        rig.run_ms(200, 10);
        let frame = rig.viz.frame();
        assert_eq!(frame.kind, FrameKind::Meter);
        // Peak of a 0.5 sine
        assert!((frame.channels[0][0] + 6.02).abs() < 0.1, "{}", frame.channels[0][0]);
    }

    #[test]
    fn test_meter_rms_with_normalization() {
        let settings = Settings {
            display_mode: DisplayMode::Meter,
            meter_rms: true,
            smoothing: SmoothingMode::None,
            normalize_volume: true,
            volume_target: -3.0,
            max_gain: 30.0,
            ..Settings::default()
        };
        let mut rig = tone_rig(settings, 1000.0, 0.1);
        rig.run_ms(1500, 10);
        let frame = rig.viz.frame();
        // A sine's RMS is 3 dB under its peak; normalization lifts it to -3 dBFS
        assert!(frame.gain_db > 10.0);
        assert!((frame.channels[0][0] + 3.0).abs() < 0.5, "{}", frame.channels[0][0]);
    }

    #[test]
    fn test_waveform_mode() {
        let settings = Settings {
            display_mode: DisplayMode::Waveform,
            waveform_ms: 50,
            width: 100,
            ..Settings::default()
        };
        let mut rig = tone_rig(settings, 440.0, 0.5);
        rig.run_ms(100, 10);
        let frame = rig.viz.frame();
        assert_eq!(frame.kind, FrameKind::Waveform);
        assert_eq!(frame.waveform[0].len(), 2400);
        assert_eq!(frame.channels[0].len(), 100);
        let peak = frame.waveform[0].iter().fold(0.0f32, |a, s| a.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_stereo_produces_two_channels() {
        let settings = Settings {
            channel_mode: ChannelMode::Stereo,
            ..spectrum_settings()
        };
        let mut rig = Rig::with_kernels(settings, 1000.0, 0.5, 2, simd::select_kernels());
        rig.run_ms(100, 10);
        assert_eq!(rig.viz.frame().channels.len(), 2);
    }

    #[test]
    fn test_render_hands_geometry_to_target() {
        struct Capture(Option<Geometry>);
        impl RenderTarget for Capture {
            type Effect = u32;
            fn draw(&mut self, effect: &u32, _: &VisualFrame, geometry: &Geometry) {
                assert_eq!(*effect, 7);
                self.0 = Some(geometry.clone());
            }
        }

        let mut rig = tone_rig(spectrum_settings(), 1000.0, 0.5);
        rig.run_ms(100, 10);
        let mut target = Capture(None);
        assert!(rig.viz.render(&mut target, &7));
        let geometry = target.0.unwrap();
        assert_eq!(geometry.primitives.len(), 1);
    }
}
