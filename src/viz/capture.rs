//! Captured audio ingestion, timestamp sync and stream-loss handling.
//!
//! ```text
//!  capture thread                          tick thread
//!  ──────────────                          ───────────
//!  CaptureHandle::capture_audio            Visualizer::tick
//!        │ try_lock_for(10ms)                    │ try_lock_for(100ms)
//!        ▼                                       ▼
//!  ┌───────────────── ReentrantMutex<RefCell<CaptureState>> ─────────────────┐
//!  │ ring buffer per output channel · capture_ts · audio_ts · tick_ts · gain │
//!  └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The lock is re-entrant because releasing a capture subscription may
//! deliver one last callback synchronously on the thread that already holds
//! it. Such a nested callback finds the state borrowed and is dropped.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::gain::GainNormalizer;
use super::ring_buffer::RingBuffer;
use super::settings::{CaptureTarget, ChannelMode, Settings};
use super::simd::DspKernels;

/// A source with no callback for this long is considered lost.
pub const CAPTURE_TIMEOUT_NS: u64 = 500_000_000;
/// Cooldown between recapture attempts.
pub const RETRY_DELAY_SECS: f32 = 2.0;
/// Largest sync correction, in either direction.
pub const MAX_TS_DELTA_NS: i64 = 16_000_000_000;

/// How long a capture callback waits for the lock before dropping its audio.
const CALLBACK_LOCK_TIMEOUT: Duration = Duration::from_millis(10);
/// Audio kept beyond the analysis window, in seconds.
const BUFFER_SLACK_SECS: usize = 1;

/// Monotonic nanosecond time source shared by capture and tick.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_ns(&self) -> u64;
}

/// Wall clock measured from construction.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Clock that only moves when told to. Drives synthetic runs and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ns(&self, ns: u64) {
        self.now.store(ns, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// One packet of planar audio from the host.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    /// One slice per input channel
    pub planes: &'a [&'a [f32]],
    /// Capture time of the first sample
    pub timestamp_ns: u64,
}

impl AudioFrame<'_> {
    /// Samples per channel (the shortest plane).
    pub fn frames(&self) -> usize {
        self.planes.iter().map(|p| p.len()).min().unwrap_or(0)
    }
}

/// Connection state of the capture subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// Not shown; no audio is processed
    Hidden,
    Connected,
    /// Callbacks stopped; waiting to retry
    Lost,
}

/// What the tick must do with the host after checking the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    None,
    /// The source timed out; release the subscription
    Release,
    /// The cooldown elapsed; try to capture again
    Recapture,
}

/// Subscribes a [`CaptureHandle`] to a host audio source.
///
/// `disconnect` must be safe while a callback is in flight and may invoke
/// the callback synchronously.
pub trait CaptureHost {
    /// Start delivering audio for `target` to `handle`. Returns `false` if
    /// the source is unavailable.
    fn connect(&mut self, target: &CaptureTarget, handle: CaptureHandle) -> bool;

    fn disconnect(&mut self);
}

pub fn frames_to_ns(frames: usize, sample_rate: u32) -> u64 {
    (frames as u128 * 1_000_000_000 / u128::from(sample_rate.max(1))) as u64
}

pub fn ns_to_frames(ns: u64, sample_rate: u32) -> usize {
    (u128::from(ns) * u128::from(sample_rate) / 1_000_000_000) as usize
}

/// Number of analysis channels produced for a channel mode.
pub fn output_channels_for(mode: ChannelMode, capture_channels: usize) -> usize {
    match mode {
        ChannelMode::Mono | ChannelMode::Single => 1,
        ChannelMode::Stereo => capture_channels.clamp(1, 2),
    }
}

/// State shared between the capture callback and the tick.
#[derive(Debug)]
pub struct CaptureState {
    sample_rate: u32,
    buffers: [RingBuffer; 2],
    capture_channels: usize,
    output_channels: usize,
    channel_mode: ChannelMode,
    channel_base: usize,
    target: CaptureTarget,
    ignore_mute: bool,
    /// Per-channel bound on buffered frames
    max_frames: usize,
    /// Frames ever appended per channel
    appended: [u64; 2],
    /// Absolute frame index one past the last drained window
    window_end: [u64; 2],
    capture_ts: u64,
    audio_ts: u64,
    tick_ts: u64,
    ts_offset: i64,
    retries: u32,
    next_retry: f32,
    link: LinkStatus,
    /// Mono downmix of the current packet
    mix: Vec<f32>,
    gain: GainNormalizer,
}

impl CaptureState {
    pub fn new(sample_rate: u32, capture_channels: usize) -> Self {
        let capture_channels = capture_channels.max(1);
        Self {
            sample_rate,
            buffers: [RingBuffer::new(), RingBuffer::new()],
            capture_channels,
            output_channels: 1,
            channel_mode: ChannelMode::Mono,
            channel_base: 0,
            target: CaptureTarget::default(),
            ignore_mute: false,
            max_frames: sample_rate as usize * (1 + BUFFER_SLACK_SECS),
            appended: [0; 2],
            window_end: [0; 2],
            capture_ts: 0,
            audio_ts: 0,
            tick_ts: 0,
            ts_offset: 0,
            retries: 0,
            next_retry: RETRY_DELAY_SECS,
            link: LinkStatus::Hidden,
            mix: Vec::new(),
            gain: GainNormalizer::new(sample_rate),
        }
    }

    /// Apply settings. `window_frames` is the longest stretch of audio the
    /// tick will read at once.
    pub fn configure(&mut self, settings: &Settings, window_frames: usize) {
        self.channel_mode = settings.channel_mode;
        self.channel_base = settings.channel_base;
        self.target = settings.capture.clone();
        self.ignore_mute = settings.ignore_mute;
        self.ts_offset = settings.sync_offset_ns();
        self.max_frames = window_frames + self.sample_rate as usize * BUFFER_SLACK_SECS;
        self.gain.configure(
            settings.normalize_volume,
            settings.volume_target,
            settings.max_gain,
        );
        self.set_output_channels(output_channels_for(self.channel_mode, self.capture_channels));
        for buf in &mut self.buffers {
            buf.truncate_front_samples(self.max_frames);
        }
    }

    fn set_output_channels(&mut self, channels: usize) {
        if channels != self.output_channels {
            tracing::debug!("Output channels: {} -> {}", self.output_channels, channels);
            self.output_channels = channels;
            self.free_buffers();
        }
    }

    /// Append one packet. Muted packets advance time but add silence.
    pub fn ingest(&mut self, frame: &AudioFrame<'_>, muted: bool, now: u64, kernels: &dyn DspKernels) {
        let frames = frame.frames();
        if frames == 0 {
            return;
        }
        let planes = frame.planes;

        if planes.len() != self.capture_channels {
            self.capture_channels = planes.len();
            self.set_output_channels(output_channels_for(self.channel_mode, self.capture_channels));
        }

        let silent = muted && !self.ignore_mute;
        self.mix.clear();
        if silent {
            self.mix.resize(frames, 0.0);
        } else if planes.len() >= 2 {
            self.mix.extend(
                planes[0][..frames]
                    .iter()
                    .zip(&planes[1][..frames])
                    .map(|(l, r)| (l + r) * 0.5),
            );
        } else {
            self.mix.extend_from_slice(&planes[0][..frames]);
        }

        let last = planes.len() - 1;
        for ch in 0..self.output_channels {
            let src: &[f32] = match self.channel_mode {
                _ if silent => &self.mix,
                ChannelMode::Mono => &self.mix,
                ChannelMode::Stereo => &planes[ch.min(last)][..frames],
                ChannelMode::Single => &planes[self.channel_base.min(last)][..frames],
            };
            let buf = &mut self.buffers[ch];
            buf.push_back_samples(src);
            buf.truncate_front_samples(self.max_frames);
            self.appended[ch] += frames as u64;
        }

        let end_ts = frame.timestamp_ns + frames_to_ns(frames, self.sample_rate);
        self.gain.push(&self.mix, end_ts, kernels);
        self.capture_ts = now;
        self.audio_ts = self.audio_ts.max(end_ts);
    }

    /// Signed delta between the end of buffered audio (plus the sync
    /// offset) and `ts`, clamped to ±16 s. Positive when audio is ahead.
    pub fn get_audio_sync(&self, ts: u64) -> i64 {
        let delta = self.audio_ts as i64 + self.ts_offset - ts as i64;
        delta.clamp(-MAX_TS_DELTA_NS, MAX_TS_DELTA_NS)
    }

    /// Nanoseconds of audio buffered past the last tick, never negative.
    pub fn available_ns(&self) -> u64 {
        self.get_audio_sync(self.tick_ts).max(0) as u64
    }

    /// Advance the link state machine for a tick at `now`.
    pub fn check_link(&mut self, now: u64, seconds: f32) -> LinkAction {
        self.tick_ts = now;
        match self.link {
            LinkStatus::Hidden => LinkAction::None,
            LinkStatus::Connected => {
                let is_bus = matches!(self.target, CaptureTarget::OutputBus { .. });
                if !is_bus && now > self.capture_ts + CAPTURE_TIMEOUT_NS {
                    self.mark_lost();
                    LinkAction::Release
                } else {
                    LinkAction::None
                }
            }
            LinkStatus::Lost => {
                self.next_retry -= seconds;
                if self.next_retry <= 0.0 {
                    self.next_retry = RETRY_DELAY_SECS;
                    self.retries += 1;
                    LinkAction::Recapture
                } else {
                    LinkAction::None
                }
            }
        }
    }

    /// Read the analysis window for a channel, `delay_frames` behind the
    /// newest audio. Older audio is consumed so the buffer holds at most
    /// `window + delay_frames` frames.
    ///
    /// Returns how many frames at the end of the window were not part of the
    /// previous drain, or `None` (and silence) if not enough audio is
    /// buffered yet.
    pub fn drain(
        &mut self,
        channel: usize,
        delay_frames: usize,
        out: &mut [f32],
    ) -> Option<usize> {
        let window = out.len();
        let buf = &mut self.buffers[channel];
        let len = buf.sample_len();
        if len < window || window == 0 {
            out.fill(0.0);
            return None;
        }
        let excess = len.saturating_sub(window + delay_frames);
        buf.drop_front_samples(excess);
        buf.peek_front_samples(out);

        let end = self.appended[channel] - (len - excess) as u64 + window as u64;
        let fresh = end.saturating_sub(self.window_end[channel]).min(window as u64);
        self.window_end[channel] = end;
        Some(fresh as usize)
    }

    /// Subscription established at `now`; the timeout restarts from here.
    pub fn on_connected(&mut self, now: u64) {
        self.link = LinkStatus::Connected;
        self.capture_ts = now;
    }

    /// Source stopped delivering: free everything and wait for a retry.
    pub fn mark_lost(&mut self) {
        self.link = LinkStatus::Lost;
        self.next_retry = RETRY_DELAY_SECS;
        self.free_buffers();
        self.gain.reset();
    }

    /// Recapture attempt failed; stay lost until the next cooldown.
    pub fn on_connect_failed(&mut self) {
        self.link = LinkStatus::Lost;
        self.next_retry = RETRY_DELAY_SECS;
    }

    pub fn on_hidden(&mut self) {
        self.link = LinkStatus::Hidden;
        self.retries = 0;
        self.next_retry = RETRY_DELAY_SECS;
        self.free_buffers();
        self.gain.reset();
    }

    fn free_buffers(&mut self) {
        for buf in &mut self.buffers {
            buf.free();
        }
        self.appended = [0; 2];
        self.window_end = [0; 2];
        self.audio_ts = 0;
    }

    pub fn link(&self) -> LinkStatus {
        self.link
    }

    pub fn target(&self) -> &CaptureTarget {
        &self.target
    }

    /// Recapture attempts since the last show.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn capture_ts(&self) -> u64 {
        self.capture_ts
    }

    pub fn audio_ts(&self) -> u64 {
        self.audio_ts
    }

    pub fn tick_ts(&self) -> u64 {
        self.tick_ts
    }

    pub fn ts_offset(&self) -> i64 {
        self.ts_offset
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn capture_channels(&self) -> usize {
        self.capture_channels
    }

    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    /// Frames buffered for a channel.
    pub fn buffered_frames(&self, channel: usize) -> usize {
        self.buffers[channel].sample_len()
    }

    pub fn gain(&self) -> &GainNormalizer {
        &self.gain
    }

    pub fn gain_mut(&mut self) -> &mut GainNormalizer {
        &mut self.gain
    }
}

struct Shared {
    state: ReentrantMutex<RefCell<CaptureState>>,
    clock: Arc<dyn Clock>,
    kernels: &'static dyn DspKernels,
}

/// Cloneable entry point for host callbacks.
#[derive(Clone)]
pub struct CaptureHandle {
    shared: Arc<Shared>,
}

impl fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("clock", &self.shared.clock)
            .field("kernels", &self.shared.kernels.level())
            .finish_non_exhaustive()
    }
}

impl CaptureHandle {
    pub fn new(
        state: CaptureState,
        clock: Arc<dyn Clock>,
        kernels: &'static dyn DspKernels,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: ReentrantMutex::new(RefCell::new(state)),
                clock,
                kernels,
            }),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.shared.clock
    }

    /// Acquire the state lock, giving up after `timeout`.
    pub fn lock(&self, timeout: Duration) -> Option<ReentrantMutexGuard<'_, RefCell<CaptureState>>> {
        self.shared.state.try_lock_for(timeout)
    }

    /// Run `f` on the state unless the lock is contended or the state is
    /// already borrowed further up this thread's stack.
    pub fn with_state<R>(&self, timeout: Duration, f: impl FnOnce(&mut CaptureState) -> R) -> Option<R> {
        let guard = self.lock(timeout)?;
        let mut state = guard.try_borrow_mut().ok()?;
        Some(f(&mut state))
    }

    /// Source capture callback.
    pub fn capture_audio(&self, source: &str, frame: &AudioFrame<'_>, muted: bool) {
        self.deliver(frame, muted, |target| match target {
            CaptureTarget::Source { name } => name.is_empty() || name == source,
            CaptureTarget::OutputBus { .. } => false,
        });
    }

    /// Output-bus capture callback for mix `mix`.
    pub fn capture_output_bus(&self, mix: usize, frame: &AudioFrame<'_>) {
        self.deliver(frame, false, |target| {
            matches!(target, CaptureTarget::OutputBus { mix: m } if *m == mix)
        });
    }

    fn deliver(&self, frame: &AudioFrame<'_>, muted: bool, accepts: impl Fn(&CaptureTarget) -> bool) {
        let now = self.shared.clock.now_ns();
        let kernels = self.shared.kernels;
        let handled = self.with_state(CALLBACK_LOCK_TIMEOUT, |state| {
            if state.link == LinkStatus::Connected && accepts(&state.target) {
                state.ingest(frame, muted, now, kernels);
            }
        });
        if handled.is_none() {
            tracing::trace!("Capture state busy, dropped {} frames", frame.frames());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viz::simd::select_kernels;

    fn connected_state(mode: ChannelMode, channels: usize) -> CaptureState {
        let mut state = CaptureState::new(1000, channels);
        let settings = Settings {
            channel_mode: mode,
            ..Settings::default()
        };
        state.configure(&settings, 100);
        state.on_connected(0);
        state
    }

    #[test]
    fn test_frame_time_conversions() {
        assert_eq!(frames_to_ns(48000, 48000), 1_000_000_000);
        assert_eq!(ns_to_frames(500_000_000, 48000), 24000);
        assert_eq!(frames_to_ns(480, 48000), 10_000_000);
    }

    #[test]
    fn test_mono_downmix() {
        let mut state = connected_state(ChannelMode::Mono, 2);
        let left = [1.0, 0.0, 0.5];
        let right = [0.0, 1.0, 0.5];
        let planes: [&[f32]; 2] = [&left, &right];
        let frame = AudioFrame { planes: &planes, timestamp_ns: 0 };
        state.ingest(&frame, false, 5, select_kernels());

        let mut out = [0.0; 3];
        assert_eq!(state.drain(0, 0, &mut out), Some(3));
        assert_eq!(out, [0.5, 0.5, 0.5]);
        assert_eq!(state.capture_ts(), 5);
        assert_eq!(state.audio_ts(), 3_000_000);
    }

    #[test]
    fn test_stereo_keeps_channels_apart() {
        let mut state = connected_state(ChannelMode::Stereo, 2);
        assert_eq!(state.output_channels(), 2);
        let planes: [&[f32]; 2] = [&[1.0, 1.0], &[-1.0, -1.0]];
        state.ingest(&AudioFrame { planes: &planes, timestamp_ns: 0 }, false, 0, select_kernels());

        let mut out = [0.0; 2];
        state.drain(1, 0, &mut out);
        assert_eq!(out, [-1.0, -1.0]);
    }

    #[test]
    fn test_stereo_with_mono_input_is_mono() {
        let state = connected_state(ChannelMode::Stereo, 1);
        assert_eq!(state.output_channels(), 1);
    }

    #[test]
    fn test_single_channel_picks_base() {
        let mut state = CaptureState::new(1000, 2);
        state.configure(
            &Settings {
                channel_mode: ChannelMode::Single,
                channel_base: 1,
                ..Settings::default()
            },
            100,
        );
        state.on_connected(0);
        let planes: [&[f32]; 2] = [&[0.1], &[0.9]];
        state.ingest(&AudioFrame { planes: &planes, timestamp_ns: 0 }, false, 0, select_kernels());
        let mut out = [0.0; 1];
        state.drain(0, 0, &mut out);
        assert_eq!(out, [0.9]);
    }

    #[test]
    fn test_muted_frames_are_silent_but_advance_time() {
        let mut state = connected_state(ChannelMode::Mono, 1);
        let planes: [&[f32]; 1] = [&[0.7; 10]];
        state.ingest(&AudioFrame { planes: &planes, timestamp_ns: 0 }, true, 0, select_kernels());
        let mut out = [1.0; 10];
        state.drain(0, 0, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(state.audio_ts(), 10_000_000);
    }

    #[test]
    fn test_ignore_mute() {
        let mut state = CaptureState::new(1000, 1);
        state.configure(
            &Settings {
                ignore_mute: true,
                ..Settings::default()
            },
            100,
        );
        state.on_connected(0);
        let planes: [&[f32]; 1] = [&[0.7; 4]];
        state.ingest(&AudioFrame { planes: &planes, timestamp_ns: 0 }, true, 0, select_kernels());
        let mut out = [0.0; 4];
        state.drain(0, 0, &mut out);
        assert_eq!(out, [0.7; 4]);
    }

    #[test]
    fn test_audio_sync_is_clamped() {
        let mut state = connected_state(ChannelMode::Mono, 1);
        let samples = vec![0.0f32; 1000];
        let planes: [&[f32]; 1] = [&samples];
        state.ingest(&AudioFrame { planes: &planes, timestamp_ns: 0 }, false, 0, select_kernels());

        assert_eq!(state.get_audio_sync(400_000_000), 600_000_000);
        assert_eq!(state.get_audio_sync(1_500_000_000), -500_000_000);
        assert_eq!(state.get_audio_sync(60_000_000_000), -MAX_TS_DELTA_NS);
    }

    #[test]
    fn test_drain_keeps_delay_and_reports_fresh() {
        let mut state = connected_state(ChannelMode::Mono, 1);
        let samples: Vec<f32> = (0..20).map(|i| i as f32).collect();
        let planes: [&[f32]; 1] = [&samples];
        state.ingest(&AudioFrame { planes: &planes, timestamp_ns: 0 }, false, 0, select_kernels());

        // Window of 4, 3 frames behind the newest: 13..=16
        let mut out = [0.0; 4];
        assert_eq!(state.drain(0, 3, &mut out), Some(4));
        assert_eq!(out, [13.0, 14.0, 15.0, 16.0]);
        assert_eq!(state.buffered_frames(0), 7);

        // Nothing new arrived
        assert_eq!(state.drain(0, 3, &mut out), Some(0));
        assert_eq!(out, [13.0, 14.0, 15.0, 16.0]);
    }

    #[test]
    fn test_drain_underfilled_is_silent() {
        let mut state = connected_state(ChannelMode::Mono, 1);
        let planes: [&[f32]; 1] = [&[1.0; 3]];
        state.ingest(&AudioFrame { planes: &planes, timestamp_ns: 0 }, false, 0, select_kernels());
        let mut out = [5.0; 8];
        assert_eq!(state.drain(0, 0, &mut out), None);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_buffer_is_bounded() {
        let mut state = connected_state(ChannelMode::Mono, 1);
        let samples = vec![0.5f32; 5000];
        let planes: [&[f32]; 1] = [&samples];
        state.ingest(&AudioFrame { planes: &planes, timestamp_ns: 0 }, false, 0, select_kernels());
        // 100-frame window plus one second of slack at 1 kHz
        assert_eq!(state.buffered_frames(0), 1100);
    }

    #[test]
    fn test_loss_and_retry_cycle() {
        let mut state = connected_state(ChannelMode::Mono, 1);
        let ms = 1_000_000u64;

        assert_eq!(state.check_link(500 * ms, 0.5), LinkAction::None);
        assert_eq!(state.check_link(501 * ms, 0.001), LinkAction::Release);
        assert_eq!(state.link(), LinkStatus::Lost);
        assert_eq!(state.buffered_frames(0), 0);

        assert_eq!(state.check_link(1501 * ms, 1.0), LinkAction::None);
        assert_eq!(state.check_link(2501 * ms, 1.0), LinkAction::Recapture);
        assert_eq!(state.retries(), 1);
        assert_eq!(state.check_link(2600 * ms, 0.1), LinkAction::None);
    }

    #[test]
    fn test_output_bus_is_never_lost() {
        let mut state = CaptureState::new(1000, 2);
        state.configure(
            &Settings {
                capture: CaptureTarget::OutputBus { mix: 0 },
                ..Settings::default()
            },
            100,
        );
        state.on_connected(0);
        assert_eq!(state.check_link(10_000_000_000, 10.0), LinkAction::None);
        assert_eq!(state.link(), LinkStatus::Connected);
    }

    #[test]
    fn test_hidden_state_ignores_callbacks() {
        let state = CaptureState::new(1000, 1);
        let handle = CaptureHandle::new(state, Arc::new(ManualClock::new()), select_kernels());
        let planes: [&[f32]; 1] = [&[1.0; 10]];
        handle.capture_audio("", &AudioFrame { planes: &planes, timestamp_ns: 0 }, false);
        let frames = handle.with_state(Duration::from_millis(10), |s| s.buffered_frames(0));
        assert_eq!(frames, Some(0));
    }

    #[test]
    fn test_source_name_filter() {
        let mut state = CaptureState::new(1000, 1);
        state.configure(
            &Settings {
                capture: CaptureTarget::Source { name: "mic".into() },
                ..Settings::default()
            },
            100,
        );
        state.on_connected(0);
        let handle = CaptureHandle::new(state, Arc::new(ManualClock::new()), select_kernels());
        let planes: [&[f32]; 1] = [&[1.0; 10]];
        let frame = AudioFrame { planes: &planes, timestamp_ns: 0 };
        handle.capture_audio("desktop", &frame, false);
        handle.capture_audio("mic", &frame, false);
        handle.capture_output_bus(0, &frame);
        let frames = handle.with_state(Duration::from_millis(10), |s| s.buffered_frames(0));
        assert_eq!(frames, Some(10));
    }

    #[test]
    fn test_reentrant_callback_is_dropped_not_deadlocked() {
        let state = connected_state(ChannelMode::Mono, 1);
        let handle = CaptureHandle::new(state, Arc::new(ManualClock::new()), select_kernels());
        let planes: [&[f32]; 1] = [&[1.0; 10]];
        let frame = AudioFrame { planes: &planes, timestamp_ns: 0 };

        let guard = handle.lock(Duration::from_millis(10)).unwrap();
        {
            let _borrowed = guard.borrow_mut();
            // Same thread, lock held and state borrowed: returns immediately
            handle.capture_audio("", &frame, false);
        }
        // Lock still held but not borrowed: re-entry succeeds
        handle.capture_audio("", &frame, false);
        assert_eq!(guard.borrow().buffered_frames(0), 10);
    }
}
