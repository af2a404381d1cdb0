//! Fundamental frequency estimation.
//!
//! Two estimators behind one interface: a normalized-difference
//! periodicity search (algorithm 0, the default) and a raw
//! autocorrelation peak picker (algorithm 1). Both run on a decimated
//! copy of the signal (the F0 search band ends at ~1.1 kHz, so ~11 kHz of
//! bandwidth is plenty) and refine the winning lag with parabolic
//! interpolation.
//!
//! Contract: one value per frame, `frame_count = floor(N / hop) + 1`;
//! output is 0 for unvoiced frames and clamped to `[f0_floor, f0_ceil]`
//! otherwise; the time axis advances by `frame_period_ms / 1000` per
//! frame.

use voz_core::error::{EngineError, ErrorKind, Result};
use voz_core::params::VoiceParameters;

/// F0 search algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum F0Algorithm {
    /// Normalized-difference periodicity search (robust default).
    #[default]
    PeriodicitySearch,
    /// Autocorrelation peak picking.
    Autocorrelation,
}

impl F0Algorithm {
    /// Maps the config integer (0/1) to an algorithm.
    pub fn from_index(index: u32) -> Result<Self> {
        match index {
            0 => Ok(F0Algorithm::PeriodicitySearch),
            1 => Ok(F0Algorithm::Autocorrelation),
            other => Err(EngineError::new(
                ErrorKind::InvalidArgument,
                format!("unknown f0 algorithm {other}"),
            )),
        }
    }
}

/// Estimator parameters.
#[derive(Debug, Clone)]
pub struct F0Config {
    /// Input sample rate, Hz.
    pub sample_rate: u32,
    /// Frame spacing, milliseconds.
    pub frame_period_ms: f64,
    /// Lowest admissible F0, Hz.
    pub f0_floor: f64,
    /// Highest admissible F0, Hz.
    pub f0_ceil: f64,
    /// Search algorithm.
    pub algorithm: F0Algorithm,
}

impl Default for F0Config {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            frame_period_ms: 5.0,
            f0_floor: 70.0,
            f0_ceil: 800.0,
            algorithm: F0Algorithm::default(),
        }
    }
}

/// Normalized-difference minimum below this value marks a voiced frame.
const VOICING_THRESHOLD: f64 = 0.35;
/// Autocorrelation peak above this fraction of `r(0)` marks a voiced frame.
const AUTOCORR_THRESHOLD: f64 = 0.5;
/// Frames quieter than this RMS are unvoiced outright.
const SILENCE_RMS: f64 = 1e-4;
/// Decimation target bandwidth; the search only needs low frequencies.
const TARGET_RATE: f64 = 11025.0;

/// F0 stream estimator.
pub struct F0Estimator {
    cfg: F0Config,
    decim: usize,
    rate_d: f64,
    min_lag: usize,
    max_lag: usize,
}

impl F0Estimator {
    /// Builds an estimator, deriving the decimation factor and lag range.
    pub fn new(cfg: F0Config) -> Result<Self> {
        if cfg.sample_rate == 0 {
            return Err(EngineError::new(
                ErrorKind::InvalidArgument,
                "sample rate must be non-zero",
            ));
        }
        if !(cfg.f0_floor > 0.0 && cfg.f0_floor < cfg.f0_ceil) {
            return Err(EngineError::new(
                ErrorKind::InvalidArgument,
                format!("f0 range [{}, {}] is empty", cfg.f0_floor, cfg.f0_ceil),
            ));
        }
        if cfg.frame_period_ms <= 0.0 {
            return Err(EngineError::new(
                ErrorKind::InvalidArgument,
                "frame period must be positive",
            ));
        }
        let decim = ((f64::from(cfg.sample_rate) / TARGET_RATE) as usize).max(1);
        let rate_d = f64::from(cfg.sample_rate) / decim as f64;
        let min_lag = ((rate_d / cfg.f0_ceil).floor() as usize).max(2);
        let max_lag = (rate_d / cfg.f0_floor).ceil() as usize;
        Ok(Self {
            cfg,
            decim,
            rate_d,
            min_lag,
            max_lag,
        })
    }

    /// Frame count this estimator produces for `samples` input samples.
    pub fn frame_count(&self, samples: usize) -> usize {
        VoiceParameters::frame_count_for(samples, self.cfg.sample_rate, self.cfg.frame_period_ms)
    }

    /// Estimates the F0 stream and its time axis.
    pub fn estimate(&self, audio: &[f32]) -> (Vec<f64>, Vec<f64>) {
        let frames = self.frame_count(audio.len());
        let decimated = self.decimate(audio);
        let hop_s = self.cfg.frame_period_ms / 1000.0;
        let window = 2 * self.max_lag;

        let mut f0 = Vec::with_capacity(frames);
        let mut time_axis = Vec::with_capacity(frames);
        let mut segment = vec![0.0f64; window];

        for i in 0..frames {
            let t = i as f64 * hop_s;
            time_axis.push(t);
            let center = (t * self.rate_d) as isize;
            self.fill_segment(&decimated, center, &mut segment);
            f0.push(self.frame_f0(&segment));
        }
        (f0, time_axis)
    }

    /// Box decimation; crude low-pass, adequate for the sub-1.1 kHz band.
    fn decimate(&self, audio: &[f32]) -> Vec<f64> {
        if self.decim == 1 {
            return audio.iter().map(|&x| f64::from(x)).collect();
        }
        audio
            .chunks(self.decim)
            .map(|c| c.iter().map(|&x| f64::from(x)).sum::<f64>() / c.len() as f64)
            .collect()
    }

    /// Copies a zero-padded window centered at `center` into `segment`.
    fn fill_segment(&self, x: &[f64], center: isize, segment: &mut [f64]) {
        let half = segment.len() as isize / 2;
        for (j, out) in segment.iter_mut().enumerate() {
            let idx = center - half + j as isize;
            *out = if idx >= 0 && (idx as usize) < x.len() {
                x[idx as usize]
            } else {
                0.0
            };
        }
    }

    fn frame_f0(&self, segment: &[f64]) -> f64 {
        let rms =
            (segment.iter().map(|x| x * x).sum::<f64>() / segment.len() as f64).sqrt();
        if rms < SILENCE_RMS {
            return 0.0;
        }
        let lag = match self.cfg.algorithm {
            F0Algorithm::PeriodicitySearch => self.search_difference(segment),
            F0Algorithm::Autocorrelation => self.search_autocorr(segment),
        };
        match lag {
            Some(lag) => (self.rate_d / lag).clamp(self.cfg.f0_floor, self.cfg.f0_ceil),
            None => 0.0,
        }
    }

    /// Cumulative-mean normalized difference search: the first local
    /// minimum below the voicing threshold wins.
    fn search_difference(&self, segment: &[f64]) -> Option<f64> {
        let w = segment.len() / 2;
        let max_lag = self.max_lag.min(w);
        let mut diff = vec![0.0f64; max_lag + 1];
        for (tau, d) in diff.iter_mut().enumerate().skip(1) {
            let mut acc = 0.0;
            for j in 0..w {
                let delta = segment[j] - segment[j + tau];
                acc += delta * delta;
            }
            *d = acc;
        }

        // Cumulative-mean normalization.
        let mut norm = vec![1.0f64; max_lag + 1];
        let mut running = 0.0;
        for tau in 1..=max_lag {
            running += diff[tau];
            norm[tau] = if running > 0.0 {
                diff[tau] * tau as f64 / running
            } else {
                1.0
            };
        }

        let mut best: Option<usize> = None;
        for tau in self.min_lag.max(2)..max_lag {
            let local_min = norm[tau] < norm[tau - 1] && norm[tau] <= norm[tau + 1];
            if local_min && norm[tau] < VOICING_THRESHOLD {
                best = Some(tau);
                break;
            }
        }
        best.map(|tau| tau as f64 + parabolic_offset(norm[tau - 1], norm[tau], norm[tau + 1]))
    }

    /// Normalized autocorrelation search: the first local peak above the
    /// threshold wins, which avoids octave-down errors.
    fn search_autocorr(&self, segment: &[f64]) -> Option<f64> {
        let w = segment.len() / 2;
        let max_lag = self.max_lag.min(w);
        let mut r = vec![0.0f64; max_lag + 1];
        for (tau, out) in r.iter_mut().enumerate() {
            let mut acc = 0.0;
            for j in 0..w {
                acc += segment[j] * segment[j + tau];
            }
            *out = acc;
        }
        let r0 = r[0];
        if r0 <= 0.0 {
            return None;
        }

        let mut best: Option<usize> = None;
        for tau in self.min_lag.max(2)..max_lag {
            let local_max = r[tau] > r[tau - 1] && r[tau] >= r[tau + 1];
            if local_max && r[tau] / r0 > AUTOCORR_THRESHOLD {
                best = Some(tau);
                break;
            }
        }
        best.map(|tau| {
            tau as f64 + parabolic_offset(-r[tau - 1], -r[tau], -r[tau + 1])
        })
    }
}

/// Sub-sample offset of the extremum of a parabola through three
/// equally-spaced points (minimum convention).
fn parabolic_offset(left: f64, mid: f64, right: f64) -> f64 {
    let denom = left - 2.0 * mid + right;
    if denom.abs() < 1e-12 {
        return 0.0;
    }
    (0.5 * (left - right) / denom).clamp(-1.0, 1.0)
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

    fn voiced_median(f0: &[f64]) -> f64 {
        let mut voiced: Vec<f64> = f0.iter().copied().filter(|&x| x > 0.0).collect();
        assert!(!voiced.is_empty(), "no voiced frames");
        voiced.sort_by(f64::total_cmp);
        voiced[voiced.len() / 2]
    }

    #[test]
    fn sine_440_is_tracked() {
        let estimator = F0Estimator::new(F0Config::default()).unwrap();
        let audio = sine(440.0, 0.3, 44100, 0.5);
        let (f0, time_axis) = estimator.estimate(&audio);
        assert_eq!(f0.len(), estimator.frame_count(audio.len()));
        assert_eq!(f0.len(), time_axis.len());
        let median = voiced_median(&f0);
        assert!(
            (390.0..=490.0).contains(&median),
            "median f0 {median} outside expected band"
        );
        // Time axis advances by the frame period.
        assert!((time_axis[1] - time_axis[0] - 0.005).abs() < 1e-12);
    }

    #[test]
    fn autocorrelation_variant_tracks_low_pitch() {
        let cfg = F0Config {
            algorithm: F0Algorithm::Autocorrelation,
            ..F0Config::default()
        };
        let estimator = F0Estimator::new(cfg).unwrap();
        let audio = sine(220.0, 0.3, 44100, 0.5);
        let (f0, _) = estimator.estimate(&audio);
        let median = voiced_median(&f0);
        assert!((200.0..=240.0).contains(&median), "median {median}");
    }

    #[test]
    fn silence_is_all_unvoiced() {
        let estimator = F0Estimator::new(F0Config::default()).unwrap();
        let audio = vec![0.0f32; 44100];
        let (f0, _) = estimator.estimate(&audio);
        assert_eq!(f0.len(), estimator.frame_count(44100));
        assert!(f0.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn noise_is_mostly_unvoiced() {
        // Deterministic xorshift noise.
        let mut state = 0x2545F491_u32;
        let audio: Vec<f32> = (0..22050)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) - 0.5
            })
            .collect();
        let estimator = F0Estimator::new(F0Config::default()).unwrap();
        let (f0, _) = estimator.estimate(&audio);
        let voiced = f0.iter().filter(|&&x| x > 0.0).count();
        assert!(
            voiced * 4 < f0.len(),
            "{voiced}/{} noise frames classified voiced",
            f0.len()
        );
    }

    #[test]
    fn output_respects_clamp_range() {
        let cfg = F0Config {
            f0_floor: 100.0,
            f0_ceil: 300.0,
            ..F0Config::default()
        };
        let estimator = F0Estimator::new(cfg).unwrap();
        let audio = sine(440.0, 0.2, 44100, 0.5);
        let (f0, _) = estimator.estimate(&audio);
        for &x in &f0 {
            assert!(x == 0.0 || (100.0..=300.0).contains(&x));
        }
    }

    #[test]
    fn invalid_config_rejected() {
        let cfg = F0Config {
            f0_floor: 500.0,
            f0_ceil: 100.0,
            ..F0Config::default()
        };
        assert!(F0Estimator::new(cfg).is_err());
        assert!(F0Algorithm::from_index(2).is_err());
        assert_eq!(
            F0Algorithm::from_index(0).unwrap(),
            F0Algorithm::PeriodicitySearch
        );
    }
}
