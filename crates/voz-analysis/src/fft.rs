//! `f64` FFT wrapper around rustfft with cached plans.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Forward/inverse FFT pair for one transform size.
pub struct Fft64 {
    fft: Arc<dyn Fft<f64>>,
    ifft: Arc<dyn Fft<f64>>,
    size: usize,
}

impl Fft64 {
    /// Plans forward and inverse transforms for `size` points.
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let ifft = planner.plan_fft_inverse(size);
        Self { fft, ifft, size }
    }

    /// Transform size in points.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Forward FFT of a real signal, zero-padded or truncated to size.
    ///
    /// Returns the positive-frequency half: `size/2 + 1` bins.
    pub fn forward_real(&self, input: &[f64]) -> Vec<Complex<f64>> {
        let mut buffer: Vec<Complex<f64>> =
            input.iter().map(|&x| Complex::new(x, 0.0)).collect();
        buffer.resize(self.size, Complex::new(0.0, 0.0));
        self.fft.process(&mut buffer);
        buffer.truncate(self.size / 2 + 1);
        buffer
    }

    /// Inverse FFT of a positive-frequency half spectrum back to a real
    /// signal of `size` samples (conjugate symmetry is reconstructed).
    pub fn inverse_real(&self, half: &[Complex<f64>]) -> Vec<f64> {
        let mut buffer = Vec::with_capacity(self.size);
        buffer.extend_from_slice(half);
        // Mirror the interior bins with conjugation.
        for i in (1..self.size + 1 - half.len()).rev() {
            buffer.push(half[i].conj());
        }
        buffer.resize(self.size, Complex::new(0.0, 0.0));
        self.ifft.process(&mut buffer);
        let scale = 1.0 / self.size as f64;
        buffer.iter().map(|c| c.re * scale).collect()
    }
}

/// Power spectrum of a half spectrum.
pub fn power(half: &[Complex<f64>]) -> Vec<f64> {
    half.iter().map(|c| c.norm_sqr()).collect()
}
