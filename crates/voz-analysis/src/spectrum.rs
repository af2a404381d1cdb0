//! Spectral envelope estimation.
//!
//! Per frame: a Hann-windowed FFT, power spectrum calibration (a unit-
//! amplitude sine maps to a peak of ~1), then F0-adaptive smoothing across
//! frequency so harmonic ripple flattens into an envelope. The `q1`
//! parameter applies an unsharp-mask compensation against the smoothing
//! (negative values soften further, the -0.15 default barely rounds the
//! peaks).
//!
//! Contract: `frame_count × (fft_size/2 + 1)` strictly positive reals;
//! unvoiced frames get a defined (flat-ish, broadband-smoothed) envelope.

use voz_core::error::{EngineError, ErrorKind, Result};
use voz_core::params::ParamMatrix;

use crate::fft::{Fft64, power};
use crate::window::Window;

/// Smoothing bandwidth for unvoiced frames, Hz.
const UNVOICED_SMOOTH_HZ: f64 = 300.0;
/// Strictly-positive floor for envelope values.
const ENVELOPE_FLOOR: f64 = 1e-10;

/// Analyzer parameters.
#[derive(Debug, Clone)]
pub struct SpectrumConfig {
    /// Input sample rate, Hz.
    pub sample_rate: u32,
    /// Frame spacing, milliseconds.
    pub frame_period_ms: f64,
    /// FFT length; power of two.
    pub fft_size: usize,
    /// Smoothing compensation coefficient.
    pub q1: f64,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            frame_period_ms: 5.0,
            fft_size: 2048,
            q1: -0.15,
        }
    }
}

/// Spectral envelope analyzer.
pub struct SpectrumAnalyzer {
    cfg: SpectrumConfig,
    fft: Fft64,
    window: Vec<f64>,
    /// `(Σw / 2)²` — divides raw power so a sine of amplitude A peaks at A².
    power_norm: f64,
}

impl SpectrumAnalyzer {
    /// Builds an analyzer; the analysis window is half the FFT length.
    pub fn new(cfg: SpectrumConfig) -> Result<Self> {
        if !cfg.fft_size.is_power_of_two() || cfg.fft_size < 64 {
            return Err(EngineError::new(
                ErrorKind::InvalidArgument,
                format!("fft_size {} must be a power of two >= 64", cfg.fft_size),
            ));
        }
        if cfg.sample_rate == 0 || cfg.frame_period_ms <= 0.0 {
            return Err(EngineError::new(
                ErrorKind::InvalidArgument,
                "sample rate and frame period must be positive",
            ));
        }
        let win_len = cfg.fft_size / 2;
        let window = Window::Hann.coefficients(win_len);
        let window_sum: f64 = window.iter().sum();
        let power_norm = (window_sum / 2.0) * (window_sum / 2.0);
        let fft = Fft64::new(cfg.fft_size);
        Ok(Self {
            cfg,
            fft,
            window,
            power_norm,
        })
    }

    /// Number of frequency bins per frame.
    pub fn bins(&self) -> usize {
        self.cfg.fft_size / 2 + 1
    }

    /// Estimates the envelope for every frame of the F0 stream.
    pub fn analyze(&self, audio: &[f32], f0: &[f64]) -> ParamMatrix {
        let bins = self.bins();
        let mut envelope = ParamMatrix::new(f0.len(), bins);
        let hop = self.cfg.frame_period_ms * f64::from(self.cfg.sample_rate) / 1000.0;
        let win_len = self.window.len();
        let mut frame_buf = vec![0.0f64; win_len];

        for (i, &frame_f0) in f0.iter().enumerate() {
            let center = (i as f64 * hop) as isize;
            self.fill_windowed(audio, center, &mut frame_buf);
            let spectrum = self.fft.forward_real(&frame_buf);
            let mut pow = power(&spectrum);
            for p in pow.iter_mut() {
                *p /= self.power_norm;
            }

            let smooth_hz = if frame_f0 > 0.0 {
                frame_f0
            } else {
                UNVOICED_SMOOTH_HZ
            };
            // Two rectangular passes make a triangular kernel, so an
            // isolated harmonic smooths into a peak centered on its bin
            // instead of a plateau.
            let half = self.bins_for_hz(smooth_hz) / 2 + 1;
            let smooth = moving_average(&moving_average(&pow, half), half);
            let row = envelope.row_mut(i);
            if self.cfg.q1 != 0.0 {
                let double = moving_average(&smooth, half);
                for k in 0..bins {
                    let v = smooth[k] + self.cfg.q1 * (smooth[k] - double[k]);
                    row[k] = v.max(ENVELOPE_FLOOR);
                }
            } else {
                for k in 0..bins {
                    row[k] = smooth[k].max(ENVELOPE_FLOOR);
                }
            }
        }
        envelope
    }

    fn bins_for_hz(&self, hz: f64) -> usize {
        let bin_width = f64::from(self.cfg.sample_rate) / self.cfg.fft_size as f64;
        ((hz / bin_width).round() as usize).max(1)
    }

    fn fill_windowed(&self, audio: &[f32], center: isize, out: &mut [f64]) {
        let half = out.len() as isize / 2;
        for (j, (slot, w)) in out.iter_mut().zip(&self.window).enumerate() {
            let idx = center - half + j as isize;
            let sample = if idx >= 0 && (idx as usize) < audio.len() {
                f64::from(audio[idx as usize])
            } else {
                0.0
            };
            *slot = sample * w;
        }
    }
}

/// Centered moving average over `2·half + 1` bins, zero-padded at the
/// edges (fixed denominator), computed from prefix sums.
fn moving_average(values: &[f64], half: usize) -> Vec<f64> {
    let n = values.len();
    if n == 0 || half == 0 {
        return values.to_vec();
    }
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for &v in values {
        acc += v;
        prefix.push(acc);
    }
    let denom = (2 * half + 1) as f64;
    (0..n)
        .map(|k| {
            let lo = k.saturating_sub(half);
            let hi = (k + half + 1).min(n);
            (prefix[hi] - prefix[lo]) / denom
        })
        .collect()
}
