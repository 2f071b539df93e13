//! Capability-tiered DSP kernels for the per-sample hot loops.
//!
//! Every hot loop of the pipeline goes through a [`DspKernels`] strategy:
//! - window application (samples × window × gain)
//! - RMS / peak accumulation (meters and volume normalization)
//! - the spectrum step (complex bins → magnitude → dBFS)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Runtime CPU Detection                        │
//! │        is_x86_feature_detected!("avx2" / "fma" / "sse4.1")      │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ once, at construction
//!          ┌────────────────────┼────────────────────┐
//!          ▼                    ▼                    ▼
//!    ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//!    │  AVX2+FMA   │ ──▶ │   SSE4.1    │ ──▶ │  Baseline   │
//!    │ spectrum,   │     │ rms, peak,  │     │ every loop, │
//!    │ window      │     │ spectrum    │     │ scalar      │
//!    └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! Each tier overrides only what it accelerates and falls through to the
//! tier below for the rest. The trait's default methods are the baseline.
//! All tiers must agree with the baseline within floating-point tolerance.
//!
//! # Safety
//!
//! The accelerated tier values can only be obtained through
//! [`select_kernels`] / [`available_tiers`], which hand them out after the
//! runtime feature check, so the `#[target_feature]` functions they call are
//! never reached on unsupported hardware.

use std::fmt;
use std::sync::OnceLock;

use rustfft::num_complex::Complex32;

use super::spectrum::dbfs;

/// CPU feature level detected at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SimdLevel {
    /// No SIMD available, use scalar fallback
    Scalar,
    /// SSE4.1 available (128-bit vectors, 4 f32 at a time)
    Sse41,
    /// AVX2 and FMA available (256-bit vectors, fused multiply-add)
    Avx2Fma,
}

impl SimdLevel {
    /// Human-readable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            SimdLevel::Scalar => "Scalar (no SIMD)",
            SimdLevel::Sse41 => "SSE4.1 (128-bit)",
            SimdLevel::Avx2Fma => "AVX2+FMA (256-bit)",
        }
    }
}

/// Cached CPU feature level (detected once at startup).
static SIMD_LEVEL: OnceLock<SimdLevel> = OnceLock::new();

/// Detect CPU SIMD capabilities at runtime.
///
/// This is cached after the first call. Safe to call from any thread.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub fn detect_simd_level() -> SimdLevel {
    *SIMD_LEVEL.get_or_init(|| {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            SimdLevel::Avx2Fma
        } else if is_x86_feature_detected!("sse4.1") {
            SimdLevel::Sse41
        } else {
            SimdLevel::Scalar
        }
    })
}

/// Fallback detection for non-x86 architectures.
#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
pub fn detect_simd_level() -> SimdLevel {
    *SIMD_LEVEL.get_or_init(|| SimdLevel::Scalar)
}

/// The hot loops of the visualization pipeline.
///
/// Default methods are the scalar baseline; accelerated tiers override a
/// subset. Slices passed together must have equal lengths.
pub trait DspKernels: Send + Sync + fmt::Debug {
    /// Tier this implementation belongs to.
    fn level(&self) -> SimdLevel;

    /// `out[i] = samples[i] * window[i] * gain`
    fn apply_window(&self, samples: &[f32], window: &[f32], gain: f32, out: &mut [f32]) {
        apply_window_scalar(samples, window, gain, out);
    }

    /// Sum of squared samples.
    fn sum_squares(&self, samples: &[f32]) -> f32 {
        sum_squares_scalar(samples)
    }

    /// Largest absolute sample value.
    fn peak(&self, samples: &[f32]) -> f32 {
        peak_scalar(samples)
    }

    /// `out[i] = |bins[i]| * scale * rolloff[i]`
    fn magnitudes(&self, bins: &[Complex32], scale: f32, rolloff: &[f32], out: &mut [f32]) {
        magnitudes_scalar(bins, scale, rolloff, out);
    }

    /// Root mean square of the samples (0 for an empty slice).
    fn compute_rms(&self, samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        (self.sum_squares(samples) / samples.len() as f32).sqrt()
    }

    /// Complex bins to compensated dBFS values.
    fn compute_spectrum_step(
        &self,
        bins: &[Complex32],
        scale: f32,
        rolloff: &[f32],
        out: &mut [f32],
    ) {
        self.magnitudes(bins, scale, rolloff, out);
        for v in out.iter_mut() {
            *v = dbfs(*v);
        }
    }
}

/// Scalar tier, available everywhere.
#[derive(Debug, Clone, Copy)]
pub struct Baseline;

impl DspKernels for Baseline {
    fn level(&self) -> SimdLevel {
        SimdLevel::Scalar
    }
}

/// 128-bit tier: meter/RMS loops and the magnitude loop.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[derive(Debug)]
pub struct Sse41 {
    _probed: (),
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
impl DspKernels for Sse41 {
    fn level(&self) -> SimdLevel {
        SimdLevel::Sse41
    }

    fn apply_window(&self, samples: &[f32], window: &[f32], gain: f32, out: &mut [f32]) {
        // SAFETY: only constructed after SSE4.1 detection
        unsafe { x86::apply_window_sse41(samples, window, gain, out) }
    }

    fn sum_squares(&self, samples: &[f32]) -> f32 {
        // SAFETY: only constructed after SSE4.1 detection
        unsafe { x86::sum_squares_sse41(samples) }
    }

    fn peak(&self, samples: &[f32]) -> f32 {
        // SAFETY: only constructed after SSE4.1 detection
        unsafe { x86::peak_sse41(samples) }
    }

    fn magnitudes(&self, bins: &[Complex32], scale: f32, rolloff: &[f32], out: &mut [f32]) {
        // SAFETY: only constructed after SSE4.1 detection
        unsafe { x86::magnitudes_sse41(bins, scale, rolloff, out) }
    }
}

/// 256-bit tier: wider spectrum and window loops with FMA; RMS and peak
/// fall through to the SSE4.1 tier.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[derive(Debug)]
pub struct Avx2Fma {
    _probed: (),
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
impl DspKernels for Avx2Fma {
    fn level(&self) -> SimdLevel {
        SimdLevel::Avx2Fma
    }

    fn apply_window(&self, samples: &[f32], window: &[f32], gain: f32, out: &mut [f32]) {
        // SAFETY: only constructed after AVX2+FMA detection
        unsafe { x86::apply_window_avx2(samples, window, gain, out) }
    }

    fn sum_squares(&self, samples: &[f32]) -> f32 {
        SSE41.sum_squares(samples)
    }

    fn peak(&self, samples: &[f32]) -> f32 {
        SSE41.peak(samples)
    }

    fn magnitudes(&self, bins: &[Complex32], scale: f32, rolloff: &[f32], out: &mut [f32]) {
        // SAFETY: only constructed after AVX2+FMA detection
        unsafe { x86::magnitudes_avx2_fma(bins, scale, rolloff, out) }
    }
}

static BASELINE: Baseline = Baseline;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
static SSE41: Sse41 = Sse41 { _probed: () };
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
static AVX2_FMA: Avx2Fma = Avx2Fma { _probed: () };

/// Resolve the best tier for this CPU. Call once and keep the result.
pub fn select_kernels() -> &'static dyn DspKernels {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        match detect_simd_level() {
            SimdLevel::Avx2Fma => &AVX2_FMA,
            SimdLevel::Sse41 => &SSE41,
            SimdLevel::Scalar => &BASELINE,
        }
    }

    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        &BASELINE
    }
}

/// The scalar tier, regardless of CPU.
pub fn baseline_kernels() -> &'static dyn DspKernels {
    &BASELINE
}

/// Every tier usable on this CPU, baseline first.
pub fn available_tiers() -> Vec<&'static dyn DspKernels> {
    let mut tiers: Vec<&'static dyn DspKernels> = vec![&BASELINE];

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        let level = detect_simd_level();
        if level >= SimdLevel::Sse41 {
            tiers.push(&SSE41);
        }
        if level >= SimdLevel::Avx2Fma {
            tiers.push(&AVX2_FMA);
        }
    }

    tiers
}

/// Log SIMD capabilities at startup.
pub fn log_capabilities() {
    let level = detect_simd_level();
    tracing::info!("SIMD visualization kernels: {}", level.name());

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if is_x86_feature_detected!("avx2") {
            tracing::debug!("  ✓ AVX2 detected");
        }
        if is_x86_feature_detected!("fma") {
            tracing::debug!("  ✓ FMA detected");
        }
        if is_x86_feature_detected!("sse4.1") {
            tracing::debug!("  ✓ SSE4.1 detected");
        }
    }
}

// ============================================================================
// Scalar baseline
// ============================================================================

/// Note: `#[inline(never)]` keeps LLVM from auto-vectorizing these loops into
/// the callers, so the benchmark compares scalar against explicit SIMD.
#[inline(never)]
fn apply_window_scalar(samples: &[f32], window: &[f32], gain: f32, out: &mut [f32]) {
    debug_assert_eq!(samples.len(), window.len());
    debug_assert_eq!(samples.len(), out.len());
    for ((o, s), w) in out.iter_mut().zip(samples).zip(window) {
        *o = s * w * gain;
    }
}

#[inline(never)]
fn sum_squares_scalar(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s * s).sum()
}

#[inline(never)]
fn peak_scalar(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

#[inline(never)]
fn magnitudes_scalar(bins: &[Complex32], scale: f32, rolloff: &[f32], out: &mut [f32]) {
    debug_assert_eq!(bins.len(), out.len());
    debug_assert_eq!(rolloff.len(), out.len());
    for ((o, c), r) in out.iter_mut().zip(bins).zip(rolloff) {
        *o = (c.re * c.re + c.im * c.im).sqrt() * scale * r;
    }
}

// ============================================================================
// x86 tiers
// ============================================================================

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod x86 {
    #[cfg(target_arch = "x86")]
    use std::arch::x86::*;
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64::*;

    use rustfft::num_complex::Complex32;

    /// SSE4.1: 4 samples at a time.
    #[target_feature(enable = "sse4.1")]
    pub(super) unsafe fn apply_window_sse41(
        samples: &[f32],
        window: &[f32],
        gain: f32,
        out: &mut [f32],
    ) {
        let len = out.len().min(samples.len()).min(window.len());
        let (sp, wp, op) = (samples.as_ptr(), window.as_ptr(), out.as_mut_ptr());
        let g = _mm_set1_ps(gain);

        let mut i = 0;
        while i + 4 <= len {
            unsafe {
                let s = _mm_loadu_ps(sp.add(i));
                let w = _mm_loadu_ps(wp.add(i));
                _mm_storeu_ps(op.add(i), _mm_mul_ps(_mm_mul_ps(s, w), g));
            }
            i += 4;
        }

        // Handle remaining samples (0-3)
        while i < len {
            out[i] = samples[i] * window[i] * gain;
            i += 1;
        }
    }

    #[target_feature(enable = "sse4.1")]
    pub(super) unsafe fn sum_squares_sse41(samples: &[f32]) -> f32 {
        let len = samples.len();
        let ptr = samples.as_ptr();
        let mut acc = _mm_setzero_ps();

        let mut i = 0;
        while i + 4 <= len {
            unsafe {
                let v = _mm_loadu_ps(ptr.add(i));
                acc = _mm_add_ps(acc, _mm_mul_ps(v, v));
            }
            i += 4;
        }

        let mut lanes = [0.0f32; 4];
        unsafe { _mm_storeu_ps(lanes.as_mut_ptr(), acc) };
        let mut sum = lanes.iter().sum::<f32>();
        while i < len {
            sum += samples[i] * samples[i];
            i += 1;
        }
        sum
    }

    #[target_feature(enable = "sse4.1")]
    pub(super) unsafe fn peak_sse41(samples: &[f32]) -> f32 {
        let len = samples.len();
        let ptr = samples.as_ptr();
        let sign = _mm_set1_ps(-0.0);
        let mut acc = _mm_setzero_ps();

        let mut i = 0;
        while i + 4 <= len {
            unsafe {
                let v = _mm_loadu_ps(ptr.add(i));
                acc = _mm_max_ps(acc, _mm_andnot_ps(sign, v));
            }
            i += 4;
        }

        let mut lanes = [0.0f32; 4];
        unsafe { _mm_storeu_ps(lanes.as_mut_ptr(), acc) };
        let mut peak = lanes.iter().fold(0.0f32, |a, &b| a.max(b));
        while i < len {
            peak = peak.max(samples[i].abs());
            i += 1;
        }
        peak
    }

    /// Four complex bins per iteration: squares, then a horizontal add pairs
    /// re² with im² in bin order.
    #[target_feature(enable = "sse4.1")]
    pub(super) unsafe fn magnitudes_sse41(
        bins: &[Complex32],
        scale: f32,
        rolloff: &[f32],
        out: &mut [f32],
    ) {
        let len = out.len().min(bins.len()).min(rolloff.len());
        // Complex32 is repr(C) { re, im }
        let bp = bins.as_ptr() as *const f32;
        let (rp, op) = (rolloff.as_ptr(), out.as_mut_ptr());
        let sc = _mm_set1_ps(scale);

        let mut i = 0;
        while i + 4 <= len {
            unsafe {
                let a = _mm_loadu_ps(bp.add(2 * i));
                let b = _mm_loadu_ps(bp.add(2 * i + 4));
                let sq = _mm_hadd_ps(_mm_mul_ps(a, a), _mm_mul_ps(b, b));
                let mag = _mm_mul_ps(_mm_sqrt_ps(sq), sc);
                let r = _mm_loadu_ps(rp.add(i));
                _mm_storeu_ps(op.add(i), _mm_mul_ps(mag, r));
            }
            i += 4;
        }

        while i < len {
            let c = bins[i];
            out[i] = (c.re * c.re + c.im * c.im).sqrt() * scale * rolloff[i];
            i += 1;
        }
    }

    /// AVX2: 8 samples at a time.
    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn apply_window_avx2(
        samples: &[f32],
        window: &[f32],
        gain: f32,
        out: &mut [f32],
    ) {
        let len = out.len().min(samples.len()).min(window.len());
        let (sp, wp, op) = (samples.as_ptr(), window.as_ptr(), out.as_mut_ptr());
        let g = _mm256_set1_ps(gain);

        let mut i = 0;
        while i + 8 <= len {
            unsafe {
                let s = _mm256_loadu_ps(sp.add(i));
                let w = _mm256_loadu_ps(wp.add(i));
                _mm256_storeu_ps(op.add(i), _mm256_mul_ps(_mm256_mul_ps(s, w), g));
            }
            i += 8;
        }

        // Handle remainder with scalar (0-7 samples)
        while i < len {
            out[i] = samples[i] * window[i] * gain;
            i += 1;
        }
    }

    /// Eight complex bins per iteration. Real and imaginary parts are
    /// deinterleaved per 128-bit lane, combined with FMA, then the 64-bit
    /// quarters are permuted back into bin order.
    #[target_feature(enable = "avx2,fma")]
    pub(super) unsafe fn magnitudes_avx2_fma(
        bins: &[Complex32],
        scale: f32,
        rolloff: &[f32],
        out: &mut [f32],
    ) {
        let len = out.len().min(bins.len()).min(rolloff.len());
        let bp = bins.as_ptr() as *const f32;
        let (rp, op) = (rolloff.as_ptr(), out.as_mut_ptr());
        let sc = _mm256_set1_ps(scale);

        let mut i = 0;
        while i + 8 <= len {
            unsafe {
                let a = _mm256_loadu_ps(bp.add(2 * i));
                let b = _mm256_loadu_ps(bp.add(2 * i + 8));
                // [r0 r1 r4 r5 | r2 r3 r6 r7] and the matching imaginary parts
                let re = _mm256_shuffle_ps::<0x88>(a, b);
                let im = _mm256_shuffle_ps::<0xDD>(a, b);
                let sq = _mm256_fmadd_ps(re, re, _mm256_mul_ps(im, im));
                let sq = _mm256_castpd_ps(_mm256_permute4x64_pd::<0xD8>(_mm256_castps_pd(sq)));
                let mag = _mm256_mul_ps(_mm256_sqrt_ps(sq), sc);
                let r = _mm256_loadu_ps(rp.add(i));
                _mm256_storeu_ps(op.add(i), _mm256_mul_ps(mag, r));
            }
            i += 8;
        }

        while i < len {
            let c = bins[i];
            out[i] = c.re.mul_add(c.re, c.im * c.im).sqrt() * scale * rolloff[i];
            i += 1;
        }
    }
}

// ============================================================================
// User-facing Benchmark (for the `bench` command)
// ============================================================================

/// Timings for one tier, in nanoseconds per call.
#[derive(Debug, Clone)]
pub struct TierTiming {
    pub level: SimdLevel,
    pub window_ns: u64,
    pub rms_ns: u64,
    pub spectrum_ns: u64,
}

/// Results from running the kernel benchmark.
#[derive(Debug, Clone)]
pub struct SimdBenchmarkResults {
    /// Detected SIMD level
    pub simd_level: SimdLevel,
    /// Sample/bin count per call
    pub block_size: usize,
    /// One entry per available tier, baseline first
    pub tiers: Vec<TierTiming>,
    /// Number of iterations used for measurement
    pub iterations: u32,
}

impl SimdBenchmarkResults {
    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "SIMD: {} | block {} | {} iterations",
            self.simd_level.name(),
            self.block_size,
            self.iterations
        );
        for t in &self.tiers {
            out.push_str(&format!(
                "\n  {:<20} window {:>6} ns | rms {:>6} ns | spectrum {:>7} ns",
                t.level.name(),
                t.window_ns,
                t.rms_ns,
                t.spectrum_ns
            ));
        }
        out
    }

    /// Spectrum-step speedup of the best tier over the baseline.
    pub fn spectrum_speedup(&self) -> f64 {
        match (self.tiers.first(), self.tiers.last()) {
            (Some(base), Some(best)) if best.spectrum_ns > 0 => {
                base.spectrum_ns as f64 / best.spectrum_ns as f64
            }
            _ => 1.0,
        }
    }
}

/// Measure every available tier on the same synthetic sine block.
pub fn run_benchmark(block_size: usize, iterations: u32) -> SimdBenchmarkResults {
    use std::hint::black_box;
    use std::time::Instant;

    let iterations = iterations.max(1);
    let samples: Vec<f32> = (0..block_size)
        .map(|i| {
            let t = i as f32 / 48000.0;
            (t * 440.0 * std::f32::consts::TAU).sin() * 0.8
        })
        .collect();
    let window = vec![0.5f32; block_size];
    let bins: Vec<Complex32> = samples
        .iter()
        .enumerate()
        .map(|(i, &s)| Complex32::new(s, (i as f32 * 0.01).cos()))
        .collect();
    let rolloff = vec![1.0f32; block_size];
    let mut out = vec![0.0f32; block_size];

    let per_call = |start: Instant| (start.elapsed().as_nanos() / iterations as u128) as u64;

    let tiers = available_tiers()
        .into_iter()
        .map(|k| {
            let start = Instant::now();
            for _ in 0..iterations {
                k.apply_window(&samples, &window, 1.0, &mut out);
                black_box(&out);
            }
            let window_ns = per_call(start);

            let start = Instant::now();
            for _ in 0..iterations {
                black_box(k.compute_rms(black_box(&samples)));
            }
            let rms_ns = per_call(start);

            let start = Instant::now();
            for _ in 0..iterations {
                k.compute_spectrum_step(&bins, 1.0, &rolloff, &mut out);
                black_box(&out);
            }
            let spectrum_ns = per_call(start);

            TierTiming {
                level: k.level(),
                window_ns,
                rms_ns,
                spectrum_ns,
            }
        })
        .collect();

    SimdBenchmarkResults {
        simd_level: detect_simd_level(),
        block_size,
        tiers,
        iterations,
    }
}

// ============================================================================
// Tests
// ============================================================================
