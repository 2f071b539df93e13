//! FFT analysis windows.

use std::f32::consts::PI;

use super::settings::WindowFunction;

/// Precomputed window coefficients plus their sum.
///
/// The sum normalizes FFT magnitudes for the energy the window removes.
/// Windows are periodic (DFT-even) over `N` points.
#[derive(Debug, Clone)]
pub struct WindowTable {
    function: WindowFunction,
    sine_exponent: u32,
    coefficients: Vec<f32>,
    sum: f32,
}

impl WindowTable {
    pub fn new(function: WindowFunction, size: usize, sine_exponent: u32) -> Self {
        let coefficients: Vec<f32> = (0..size)
            .map(|n| coefficient(function, n, size, sine_exponent))
            .collect();
        let sum = coefficients.iter().sum();
        Self {
            function,
            sine_exponent,
            coefficients,
            sum,
        }
    }

    /// Whether the table must be rebuilt for these parameters.
    pub fn is_stale(&self, function: WindowFunction, size: usize, sine_exponent: u32) -> bool {
        self.function != function
            || self.coefficients.len() != size
            || (function == WindowFunction::PowerOfSine && self.sine_exponent != sine_exponent)
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    pub fn sum(&self) -> f32 {
        self.sum
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    pub fn function(&self) -> WindowFunction {
        self.function
    }
}

/// Cosine-sum windows: `a0 - a1·cos(x) + a2·cos(2x) - a3·cos(3x)`.
fn cosine_sum(a: [f32; 4], x: f32) -> f32 {
    a[0] - a[1] * x.cos() + a[2] * (2.0 * x).cos() - a[3] * (3.0 * x).cos()
}

fn coefficient(function: WindowFunction, n: usize, size: usize, sine_exponent: u32) -> f32 {
    if size <= 1 {
        return 1.0;
    }
    let x = 2.0 * PI * n as f32 / size as f32;
    match function {
        WindowFunction::None => 1.0,
        WindowFunction::Hann => cosine_sum([0.5, 0.5, 0.0, 0.0], x),
        WindowFunction::Hamming => cosine_sum([0.54, 0.46, 0.0, 0.0], x),
        WindowFunction::Blackman => cosine_sum([0.42, 0.5, 0.08, 0.0], x),
        WindowFunction::BlackmanHarris => cosine_sum([0.35875, 0.48829, 0.14128, 0.01168], x),
        WindowFunction::PowerOfSine => (PI * n as f32 / size as f32)
            .sin()
            .abs()
            .powi(sine_exponent.max(1) as i32),
    }
}
