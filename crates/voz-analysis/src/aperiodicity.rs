//! Band aperiodicity estimation.
//!
//! Per frame the analyzer measures periodicity as the normalized
//! autocorrelation at the F0 lag over a two-period window. The residual
//! `1 − r` becomes the base aperiodicity, spread across frequency with a
//! mild upward tilt (voiced speech gets breathier toward the top of the
//! band). Frames whose periodicity fails the configured threshold — and
//! all unvoiced frames — receive the noise profile around 0.9.
//!
//! Contract: `frame_count × (fft_size/2 + 1)` values in `(0, 1]`;
//! typically ≤ 0.2 for voiced frames and ≈ 0.9 for unvoiced ones.

use voz_core::error::{EngineError, ErrorKind, Result};
use voz_core::params::ParamMatrix;

/// Lowest emitted aperiodicity; keeps values strictly inside (0, 1].
const AP_FLOOR: f64 = 0.01;
/// Base aperiodicity of the unvoiced/noise profile.
const UNVOICED_BASE: f64 = 0.9;
/// Top-of-band value the unvoiced profile tilts toward.
const UNVOICED_TOP: f64 = 0.95;

/// Analyzer parameters.
#[derive(Debug, Clone)]
pub struct AperiodicityConfig {
    /// Input sample rate, Hz.
    pub sample_rate: u32,
    /// Frame spacing, milliseconds.
    pub frame_period_ms: f64,
    /// FFT length that fixes the output width; power of two.
    pub fft_size: usize,
    /// Periodicity acceptance threshold in (0, 1); frames below it take
    /// the noise profile.
    pub threshold: f64,
}

impl Default for AperiodicityConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            frame_period_ms: 5.0,
            fft_size: 2048,
            threshold: 0.85,
        }
    }
}

/// Band aperiodicity analyzer.
pub struct AperiodicityAnalyzer {
    cfg: AperiodicityConfig,
}

impl AperiodicityAnalyzer {
    /// Builds an analyzer after basic sanity checks.
    pub fn new(cfg: AperiodicityConfig) -> Result<Self> {
        if !(0.0..=1.0).contains(&cfg.threshold) {
            return Err(EngineError::new(
                ErrorKind::InvalidArgument,
                format!("aperiodicity threshold {} outside [0, 1]", cfg.threshold),
            ));
        }
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
        Ok(Self { cfg })
    }

    /// Number of frequency bins per frame.
    pub fn bins(&self) -> usize {
        self.cfg.fft_size / 2 + 1
    }

    /// Estimates band aperiodicity for every frame of the F0 stream.
    pub fn analyze(&self, audio: &[f32], f0: &[f64]) -> ParamMatrix {
        let bins = self.bins();
        let mut ap = ParamMatrix::new(f0.len(), bins);
        let hop = self.cfg.frame_period_ms * f64::from(self.cfg.sample_rate) / 1000.0;

        for (i, &frame_f0) in f0.iter().enumerate() {
            let center = (i as f64 * hop) as isize;
            let row = ap.row_mut(i);
            if frame_f0 <= 0.0 {
                fill_profile(row, UNVOICED_BASE, UNVOICED_TOP);
                continue;
            }
            let r = self.periodicity_at(audio, center, frame_f0);
            if r < self.cfg.threshold {
                // Periodic confidence failed: fall back to the noise profile.
                fill_profile(row, UNVOICED_BASE, UNVOICED_TOP);
            } else {
                let base = (1.0 - r).clamp(AP_FLOOR, 0.5);
                // Voiced profile: base at DC, doubling toward Nyquist.
                fill_profile(row, base, (2.0 * base).min(1.0));
            }
        }
        ap
    }

    /// Normalized autocorrelation at the (rounded) F0 lag over a
    /// two-period window centered on the frame.
    fn periodicity_at(&self, audio: &[f32], center: isize, f0: f64) -> f64 {
        let rate = f64::from(self.cfg.sample_rate);
        let lag = (rate / f0).round() as usize;
        if lag == 0 {
            return 0.0;
        }
        let w = 2 * lag;
        let start = center - w as isize / 2;

        let sample = |idx: isize| -> f64 {
            if idx >= 0 && (idx as usize) < audio.len() {
                f64::from(audio[idx as usize])
            } else {
                0.0
            }
        };

        let mut cross = 0.0;
        let mut energy_a = 0.0;
        let mut energy_b = 0.0;
        for j in 0..w {
            let a = sample(start + j as isize);
            let b = sample(start + (j + lag) as isize);
            cross += a * b;
            energy_a += a * a;
            energy_b += b * b;
        }
        let denom = (energy_a * energy_b).sqrt();
        if denom < 1e-12 {
            return 0.0;
        }
        (cross / denom).clamp(-1.0, 1.0)
    }
}

/// Quadratic tilt from `base` at DC to `top` at Nyquist, clamped to (0, 1].
fn fill_profile(row: &mut [f64], base: f64, top: f64) {
    let n = row.len();
    let denom = (n.saturating_sub(1)).max(1) as f64;
    for (k, v) in row.iter_mut().enumerate() {
        let x = k as f64 / denom;
        *v = (base + (top - base) * x * x).clamp(AP_FLOOR, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    fn sine(freq: f64, secs: f64, rate: u32, amp: f32) -> Vec<f32> {
        let n = (secs * f64::from(rate)) as usize;
        (0..n)
            .map(|i| amp * (TAU * freq * i as f64 / f64::from(rate)).sin() as f32)
            .collect()
    }

    #[test]
    fn voiced_frames_are_mostly_periodic() {
        let analyzer = AperiodicityAnalyzer::new(AperiodicityConfig::default()).unwrap();
        let audio = sine(220.0, 0.2, 44100, 0.5);
        let f0 = vec![220.0; 41];
        let ap = analyzer.analyze(&audio, &f0);
        assert_eq!(ap.rows(), 41);
        assert_eq!(ap.cols(), 1025);
        // Lower half of the band on a mid-stream frame stays low.
        let row = ap.row(20);
        for &v in &row[..row.len() / 2] {
            assert!(v <= 0.2, "voiced low-band aperiodicity {v} too high");
        }
        assert!(ap.as_slice().iter().all(|&v| v > 0.0 && v <= 1.0));
    }

    #[test]
    fn unvoiced_frames_take_noise_profile() {
        let analyzer = AperiodicityAnalyzer::new(AperiodicityConfig::default()).unwrap();
        let audio = vec![0.0f32; 8820];
        let f0 = vec![0.0; 21];
        let ap = analyzer.analyze(&audio, &f0);
        for r in 0..ap.rows() {
            let row = ap.row(r);
            assert!((row[0] - UNVOICED_BASE).abs() < 1e-9);
            assert!(row[row.len() - 1] <= 1.0);
            assert!(row[row.len() - 1] >= UNVOICED_BASE);
        }
    }

    #[test]
    fn threshold_pushes_weak_periodicity_to_noise() {
        // Claim 300 Hz voicing over white noise; periodicity fails the
        // threshold, so the noise profile must win.
        let mut state = 0x9E3779B9_u32;
        let audio: Vec<f32> = (0..8820)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) - 0.5
            })
            .collect();
        let analyzer = AperiodicityAnalyzer::new(AperiodicityConfig::default()).unwrap();
        let f0 = vec![300.0; 21];
        let ap = analyzer.analyze(&audio, &f0);
        let mid = ap.row(10);
        assert!((mid[0] - UNVOICED_BASE).abs() < 1e-9);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let cfg = AperiodicityConfig {
            threshold: 1.5,
            ..AperiodicityConfig::default()
        };
        assert!(AperiodicityAnalyzer::new(cfg).is_err());
    }
}
