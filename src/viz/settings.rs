//! Visualizer settings snapshot and mode enums.
//!
//! A [`Settings`] value is applied atomically by
//! [`Visualizer::update`](super::Visualizer::update) and stays immutable until
//! the next update. Out-of-range values are corrected when applied, never
//! rejected.

use serde::{Deserialize, Serialize};

/// FFT analysis window family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunction {
    /// Rectangular window (all ones)
    None,
    #[default]
    Hann,
    Hamming,
    Blackman,
    BlackmanHarris,
    /// `sin(πn/N)^exponent`, exponent from [`Settings::sine_exponent`]
    PowerOfSine,
}

/// How FFT bins are resampled onto bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpMode {
    /// Nearest bin
    Point,
    /// Windowed sinc over [`Settings::lanczos_radius`] bins
    #[default]
    Lanczos,
    /// Cardinal cubic spline (Catmull-Rom at zero tension)
    CatmullRom,
}

/// How several FFT bins folding into one log-scaled bar are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandConsolidation {
    /// Loudest bin in the band
    #[default]
    Max,
    /// Mean of the band's dB values
    Average,
}

/// Smoothing filter applied across neighbouring bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    None,
    #[default]
    Gauss,
}

/// Frame-to-frame smoothing of bar values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMode {
    None,
    /// Fixed per-frame EMA coefficient (the gravity value itself)
    #[default]
    Exponential,
    /// Decay derived from elapsed frame time, independent of frame rate
    TimeVariant,
}

/// Fill style, interpreted by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    Line,
    #[default]
    Solid,
    Gradient,
    Pulse,
    Range,
}

/// What is computed and how it is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    Curve,
    Bar,
    SteppedBar,
    Meter,
    SteppedMeter,
    Waveform,
}

impl DisplayMode {
    /// Meter modes read the peak/RMS engine instead of the FFT.
    pub fn is_meter(self) -> bool {
        matches!(self, DisplayMode::Meter | DisplayMode::SteppedMeter)
    }

    /// Modes drawn as discrete bars.
    pub fn is_bar(self) -> bool {
        matches!(self, DisplayMode::Bar | DisplayMode::SteppedBar)
    }
}

/// Which input channels are analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    /// Downmix to one channel
    #[default]
    Mono,
    /// Left and right separately (mono input stays mono)
    Stereo,
    /// One input channel, chosen by [`Settings::channel_base`]
    Single,
}

/// Where audio comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaptureTarget {
    /// A named audio source
    Source { name: String },
    /// The final mixed output of the given mix index
    OutputBus { mix: usize },
}

impl Default for CaptureTarget {
    fn default() -> Self {
        CaptureTarget::Source {
            name: String::new(),
        }
    }
}

/// Complete visualizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub capture: CaptureTarget,

    pub render_mode: RenderMode,
    pub display_mode: DisplayMode,
    pub channel_mode: ChannelMode,
    /// Input channel used in [`ChannelMode::Single`]
    pub channel_base: usize,

    pub window: WindowFunction,
    /// Exponent for [`WindowFunction::PowerOfSine`]
    pub sine_exponent: u32,
    pub interp_mode: InterpMode,
    /// Lanczos kernel radius in bins
    pub lanczos_radius: u32,
    /// Cardinal spline tension (0 = Catmull-Rom, 1 = linear tangents)
    pub spline_tension: f32,
    pub band_consolidation: BandConsolidation,
    pub filter_mode: FilterMode,
    /// Gaussian filter radius in bars (0 = no-op)
    pub filter_radius: f32,
    pub smoothing: SmoothingMode,
    /// Decay amount, 0.0 - 1.0
    pub gravity: f32,
    /// Instant attack in meter mode
    pub fast_peaks: bool,

    /// Pick the FFT size from the bar count
    pub auto_fft_size: bool,
    /// Manual FFT size (rounded to a multiple of 16)
    pub fft_size: usize,
    pub log_scale: bool,
    pub mirror_freq_axis: bool,
    /// Lowest displayed frequency in Hz
    pub cutoff_low: u32,
    /// Highest displayed frequency in Hz
    pub cutoff_high: u32,
    /// Display floor in dBFS
    pub floor: i32,
    /// Display ceiling in dBFS
    pub ceiling: i32,
    /// High-frequency emphasis ramp across bars, 0.0 - 1.0
    pub slope: f32,
    /// Roll-off knee sharpness
    pub rolloff_q: f32,
    /// Roll-off compensation in dB per octave above the knee
    pub rolloff_rate: f32,

    pub meter_rms: bool,
    /// Meter integration window in milliseconds
    pub meter_ms: u32,
    /// Waveform history in milliseconds
    pub waveform_ms: u32,

    pub normalize_volume: bool,
    /// Normalization target in dBFS
    pub volume_target: f32,
    /// Maximum normalization gain in dB
    pub max_gain: f32,

    /// Audio/video sync correction in milliseconds
    pub sync_offset_ms: i32,
    /// Analyze muted audio anyway
    pub ignore_mute: bool,

    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    pub bar_width: u32,
    pub bar_gap: u32,
    pub step_width: u32,
    pub step_gap: u32,
    pub min_bar_height: u32,
    pub channel_spacing: u32,
    pub invert: bool,
    pub radial: bool,
    /// Inner radius of the radial layout, 0.0 - 1.0
    pub deadzone: f32,
    /// Fraction of a full circle covered by the radial layout
    pub radial_arc: f32,
    /// Radial start angle, fraction of a full turn
    pub radial_rotation: f32,
    pub hide_on_silent: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            capture: CaptureTarget::default(),
            render_mode: RenderMode::Solid,
            display_mode: DisplayMode::Curve,
            channel_mode: ChannelMode::Mono,
            channel_base: 0,
            window: WindowFunction::Hann,
            sine_exponent: 2,
            interp_mode: InterpMode::Lanczos,
            lanczos_radius: 3,
            spline_tension: 0.0,
            band_consolidation: BandConsolidation::Max,
            filter_mode: FilterMode::Gauss,
            filter_radius: 0.0,
            smoothing: SmoothingMode::Exponential,
            gravity: 0.65,
            fast_peaks: false,
            auto_fft_size: true,
            fft_size: 4096,
            log_scale: true,
            mirror_freq_axis: false,
            cutoff_low: 30,
            cutoff_high: 17500,
            floor: -65,
            ceiling: 0,
            slope: 0.0,
            rolloff_q: 0.45,
            rolloff_rate: 0.0,
            meter_rms: false,
            meter_ms: 100,
            waveform_ms: 100,
            normalize_volume: false,
            volume_target: -3.0,
            max_gain: 30.0,
            sync_offset_ms: 0,
            ignore_mute: false,
            width: 800,
            height: 225,
            bar_width: 8,
            bar_gap: 2,
            step_width: 8,
            step_gap: 2,
            min_bar_height: 0,
            channel_spacing: 0,
            invert: false,
            radial: false,
            deadzone: 0.2,
            radial_arc: 1.0,
            radial_rotation: 0.0,
            hide_on_silent: false,
        }
    }
}

/// Alignment quantum for FFT and buffer sizes.
pub const SIZE_QUANTUM: usize = 16;
const MIN_FFT_SIZE: usize = SIZE_QUANTUM;
const MAX_FFT_SIZE: usize = 65536;
const AUTO_FFT_MIN: usize = 1024;
const AUTO_FFT_MAX: usize = 8192;
/// Bins per bar targeted by the automatic FFT size.
const AUTO_BINS_PER_BAR: usize = 32;

impl Settings {
    /// Number of output values for the current display mode.
    ///
    /// Curves use one point per pixel column; bars fit as many
    /// `bar_width + bar_gap` slots as the width allows.
    pub fn num_bars(&self) -> usize {
        let width = self.width.max(1) as usize;
        if self.display_mode.is_bar() {
            let slot = (self.bar_width.max(1) + self.bar_gap) as usize;
            ((width + self.bar_gap as usize) / slot).max(1)
        } else {
            width
        }
    }

    /// FFT size after applying auto selection and rounding.
    pub fn effective_fft_size(&self) -> usize {
        if self.auto_fft_size {
            (self.num_bars() * AUTO_BINS_PER_BAR)
                .next_power_of_two()
                .clamp(AUTO_FFT_MIN, AUTO_FFT_MAX)
        } else {
            round_to_quantum(self.fft_size).clamp(MIN_FFT_SIZE, MAX_FFT_SIZE)
        }
    }

    /// Display floor and ceiling in dBFS, ordered and at least 1 dB apart.
    pub fn db_range(&self) -> (f32, f32) {
        let floor = self.floor.min(self.ceiling) as f32;
        let ceiling = (self.ceiling.max(self.floor) as f32).max(floor + 1.0);
        (floor, ceiling)
    }

    /// Sync offset in nanoseconds.
    pub fn sync_offset_ns(&self) -> i64 {
        i64::from(self.sync_offset_ms) * 1_000_000
    }
}

/// Round to the nearest multiple of [`SIZE_QUANTUM`], never below one quantum.
pub fn round_to_quantum(n: usize) -> usize {
    let rounded = (n + SIZE_QUANTUM / 2) / SIZE_QUANTUM * SIZE_QUANTUM;
    rounded.max(SIZE_QUANTUM)
}
