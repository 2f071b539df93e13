//! Mapping of FFT bins onto display bars.
//!
//! Each bar gets a fractional source index between the low and high cutoff
//! bins, spaced linearly or logarithmically. Bars whose band covers several
//! bins on a log axis consolidate the band; every other bar is resampled
//! through precomputed interpolation taps. An optional Gaussian filter then
//! smooths across neighbouring bars.

use smallvec::SmallVec;
use std::f32::consts::PI;

use super::settings::{BandConsolidation, FilterMode, InterpMode, Settings};
use super::spectrum::dbfs;

/// Interpolation taps for one bar: `(bin, weight)` pairs.
pub type Taps = SmallVec<[(u32, f32); 8]>;

/// Inputs the tables depend on; a change triggers a rebuild.
#[derive(Debug, Clone, PartialEq)]
struct MapperKey {
    num_bars: usize,
    fft_size: usize,
    sample_rate: u32,
    cutoff_low: u32,
    cutoff_high: u32,
    log_scale: bool,
    mirror: bool,
    interp: InterpMode,
    lanczos_radius: u32,
    spline_tension: f32,
    filter_radius: f32,
    slope: f32,
}

impl MapperKey {
    fn new(settings: &Settings, fft_size: usize, sample_rate: u32) -> Self {
        Self {
            num_bars: settings.num_bars(),
            fft_size,
            sample_rate,
            cutoff_low: settings.cutoff_low,
            cutoff_high: settings.cutoff_high,
            log_scale: settings.log_scale,
            mirror: settings.mirror_freq_axis,
            interp: settings.interp_mode,
            lanczos_radius: settings.lanczos_radius.max(1),
            spline_tension: settings.spline_tension.clamp(0.0, 1.0),
            filter_radius: match settings.filter_mode {
                FilterMode::None => 0.0,
                FilterMode::Gauss => settings.filter_radius.max(0.0),
            },
            slope: settings.slope.max(0.0),
        }
    }
}

/// Bar tables plus the scratch sequences used while mapping.
#[derive(Debug, Clone)]
pub struct BinMapper {
    key: MapperKey,
    consolidation: BandConsolidation,
    /// Fractional source bin per bar
    indices: Vec<f32>,
    band_start: Vec<u32>,
    band_width: Vec<u32>,
    taps: Vec<Taps>,
    /// Gaussian half kernel, center first
    kernel: Vec<f32>,
    /// dB added per bar for slope compensation
    slope_db: Vec<f32>,
    /// Per-channel results plus one intermediate for filtering
    scratch: [Vec<f32>; 3],
}

impl BinMapper {
    pub fn new(settings: &Settings, fft_size: usize, sample_rate: u32) -> Self {
        let mut mapper = Self {
            key: MapperKey::new(settings, fft_size, sample_rate),
            consolidation: settings.band_consolidation,
            indices: Vec::new(),
            band_start: Vec::new(),
            band_width: Vec::new(),
            taps: Vec::new(),
            kernel: Vec::new(),
            slope_db: Vec::new(),
            scratch: [Vec::new(), Vec::new(), Vec::new()],
        };
        mapper.rebuild();
        mapper
    }

    /// Apply new settings, rebuilding the tables if anything they depend on
    /// changed.
    pub fn configure(&mut self, settings: &Settings, fft_size: usize, sample_rate: u32) {
        self.consolidation = settings.band_consolidation;
        let key = MapperKey::new(settings, fft_size, sample_rate);
        if key != self.key {
            self.key = key;
            self.rebuild();
        }
    }

    fn rebuild(&mut self) {
        let k = &self.key;
        let n = k.num_bars.max(1);
        let max_bin = (k.fft_size / 2).max(1) as f32;
        let to_bin = |hz: u32| hz as f32 * k.fft_size as f32 / k.sample_rate.max(1) as f32;
        let low = to_bin(k.cutoff_low.min(k.cutoff_high)).clamp(1.0, max_bin);
        let high = to_bin(k.cutoff_high.max(k.cutoff_low)).clamp(low, max_bin);

        self.indices = (0..n)
            .map(|i| {
                let span = (n - 1).max(1) as f32;
                if k.log_scale {
                    low * (high / low).powf(i as f32 / span)
                } else {
                    low + (high - low) * i as f32 / span
                }
            })
            .collect();

        self.band_start = self.indices.iter().map(|&idx| idx as u32).collect();
        self.band_width = (0..n)
            .map(|i| {
                let start = self.band_start[i];
                let end = self.band_start.get(i + 1).copied().unwrap_or(start + 1);
                end.saturating_sub(start).max(1)
            })
            .collect();

        let last = max_bin as u32;
        self.taps = self
            .indices
            .iter()
            .map(|&idx| match k.interp {
                InterpMode::Point => point_taps(idx, last),
                InterpMode::Lanczos => lanczos_taps(idx, k.lanczos_radius, last),
                InterpMode::CatmullRom => cardinal_taps(idx, k.spline_tension, last),
            })
            .collect();

        if k.mirror {
            self.indices.reverse();
            self.band_start.reverse();
            self.band_width.reverse();
            self.taps.reverse();
        }

        self.kernel = gaussian_kernel(k.filter_radius);
        self.slope_db = slope_table(n, k.slope);
        for s in &mut self.scratch {
            s.clear();
            s.resize(n, 0.0);
        }

        tracing::debug!(
            "Rebuilt bin tables: {} bars, FFT {}, bins {:.1}..{:.1}{}",
            n,
            k.fft_size,
            low,
            high,
            if k.log_scale { " (log)" } else { "" }
        );
    }

    pub fn num_bars(&self) -> usize {
        self.indices.len()
    }

    /// Fractional source bin for each bar.
    pub fn indices(&self) -> &[f32] {
        &self.indices
    }

    /// Number of FFT bins each bar covers.
    pub fn band_widths(&self) -> &[u32] {
        &self.band_width
    }

    /// Slope compensation in dB per bar.
    pub fn slope_db(&self) -> &[f32] {
        &self.slope_db
    }

    /// Frequency span `[lo, hi)` in Hz covered by a bar. Each bin stands for
    /// the frequencies nearest to its center.
    pub fn bar_frequency_range(&self, bar: usize) -> (f32, f32) {
        let hz_per_bin = self.key.sample_rate as f32 / self.key.fft_size as f32;
        let start = self.band_start[bar] as f32;
        let end = start + self.band_width[bar] as f32;
        (
            ((start - 0.5) * hz_per_bin).max(0.0),
            (end - 0.5) * hz_per_bin,
        )
    }

    /// First bar whose frequency span contains `hz`.
    pub fn bar_for_frequency(&self, hz: f32) -> Option<usize> {
        (0..self.num_bars()).find(|&bar| {
            let (lo, hi) = self.bar_frequency_range(bar);
            hz >= lo && hz < hi
        })
    }

    /// Map one channel's dB spectrum onto the bars and filter it.
    ///
    /// Each source bin gets its bar's slope gain and is raised to `floor`
    /// before interpolation, so values below the display range never leak
    /// into neighbouring bars. `channel` selects which scratch sequence holds
    /// the result (0 or 1).
    pub fn map(&mut self, channel: usize, spectrum_db: &[f32], floor: f32) -> &[f32] {
        let [ch0, ch1, tmp] = &mut self.scratch;
        let dst = if channel == 0 { ch0 } else { ch1 };
        let last = spectrum_db.len().saturating_sub(1);

        for (bar, out) in dst.iter_mut().enumerate() {
            let slope = self.slope_db[bar];
            let bin_db = |bin: usize| (spectrum_db[bin.min(last)] + slope).max(floor);
            let width = self.band_width[bar] as usize;
            let value: f32 = if self.key.log_scale && width > 1 {
                let start = (self.band_start[bar] as usize).min(last);
                let end = (start + width).min(last + 1);
                consolidate((start..end).map(bin_db), self.consolidation)
            } else {
                // Offsets from the first tap keep constant input exact
                let taps = &self.taps[bar];
                let base = taps.first().map_or(floor, |&(bin, _)| bin_db(bin as usize));
                base + taps
                    .iter()
                    .map(|&(bin, w)| (bin_db(bin as usize) - base) * w)
                    .sum::<f32>()
            };
            // Lanczos lobes can undershoot
            *out = value.max(floor);
        }

        if self.kernel.len() > 1 {
            gaussian_filter(dst, &self.kernel, tmp);
            dst.copy_from_slice(tmp);
        }
        dst
    }

    /// Map raw linear values (meters, waveform points) onto the bars by
    /// nearest position, without interpolation.
    pub fn map_linear(&self, values: &[f32], out: &mut Vec<f32>) {
        out.clear();
        if values.is_empty() {
            out.resize(self.num_bars(), 0.0);
            return;
        }
        let n = self.num_bars();
        let step = values.len() as f32 / n as f32;
        out.extend((0..n).map(|i| values[((i as f32 * step) as usize).min(values.len() - 1)]));
    }
}

fn consolidate(band: impl Iterator<Item = f32>, policy: BandConsolidation) -> f32 {
    match policy {
        BandConsolidation::Max => band.fold(f32::MIN, f32::max),
        BandConsolidation::Average => {
            let (sum, count) = band.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            sum / count.max(1) as f32
        }
    }
}

/// Nearest bin.
pub fn point_taps(idx: f32, last: u32) -> Taps {
    let mut taps = Taps::new();
    taps.push(((idx.round() as u32).min(last), 1.0));
    taps
}

fn sinc(x: f32) -> f32 {
    if x == 0.0 {
        1.0
    } else {
        let px = PI * x;
        px.sin() / px
    }
}

/// Windowed sinc over `radius` bins each side, normalized to unit gain.
pub fn lanczos_taps(idx: f32, radius: u32, last: u32) -> Taps {
    let center = idx.floor();
    if idx == center {
        return point_taps(idx, last);
    }

    let a = radius.max(1) as i64;
    let base = center as i64;
    let mut taps = Taps::new();
    for k in (base - a + 1)..=(base + a) {
        if k < 0 || k > i64::from(last) {
            continue;
        }
        let x = idx - k as f32;
        let w = sinc(x) * sinc(x / a as f32);
        if w != 0.0 {
            taps.push((k as u32, w));
        }
    }

    let total: f32 = taps.iter().map(|t| t.1).sum();
    if total.abs() > f32::EPSILON {
        for t in &mut taps {
            t.1 /= total;
        }
    }
    taps
}

/// Cardinal cubic spline through the four neighbouring bins. Tension 0 is
/// Catmull-Rom.
pub fn cardinal_taps(idx: f32, tension: f32, last: u32) -> Taps {
    let center = idx.floor();
    let t = idx - center;
    if t == 0.0 {
        return point_taps(idx, last);
    }

    let s = (1.0 - tension) / 2.0;
    let (t2, t3) = (t * t, t * t * t);
    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + t;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h11 = t3 - t2;

    let base = center as i64;
    let clamp = |k: i64| k.clamp(0, i64::from(last)) as u32;
    let mut taps = Taps::new();
    taps.push((clamp(base - 1), -s * h10));
    taps.push((clamp(base), h00 - s * h11));
    taps.push((clamp(base + 1), h01 + s * h10));
    taps.push((clamp(base + 2), s * h11));
    taps
}

/// Half of a normalized Gaussian kernel, center first. Radius 0 gives the
/// identity kernel `[1.0]`.
pub fn gaussian_kernel(radius: f32) -> Vec<f32> {
    if radius <= 0.0 {
        return vec![1.0];
    }
    let half = radius.ceil() as usize;
    let sigma = radius / 2.0;
    (0..=half)
        .map(|k| (-((k * k) as f32) / (2.0 * sigma * sigma)).exp())
        .collect()
}

/// Convolve `src` with a symmetric half kernel into `dst`. Weights falling
/// off either edge are dropped and the rest renormalized. Neighbours are
/// summed as offsets from the center value, so flat runs come out unchanged.
pub fn gaussian_filter(src: &[f32], kernel: &[f32], dst: &mut [f32]) {
    if kernel.len() <= 1 {
        dst.copy_from_slice(src);
        return;
    }

    let n = src.len() as isize;
    let half = kernel.len() as isize - 1;
    for (i, out) in dst.iter_mut().enumerate() {
        let i = i as isize;
        let center = src[i as usize];
        let mut acc = 0.0;
        let mut weight = 0.0;
        for k in -half..=half {
            let j = i + k;
            if (0..n).contains(&j) {
                let w = kernel[k.unsigned_abs()];
                acc += (src[j as usize] - center) * w;
                weight += w;
            }
        }
        *out = center + acc / weight;
    }
}

/// `20·log10(1 + slope·i/(n−1))` dB per bar.
pub fn slope_table(num_bars: usize, slope: f32) -> Vec<f32> {
    if slope <= 0.0 {
        return vec![0.0; num_bars];
    }
    let span = num_bars.saturating_sub(1).max(1) as f32;
    (0..num_bars)
        .map(|i| dbfs(1.0 + slope * i as f32 / span))
        .collect()
}
