//! Harmonic-plus-noise synthesis engine.

use std::f64::consts::TAU;

use voz_analysis::{Fft64, Window};
use voz_core::error::{EngineError, ErrorKind, Result};
use voz_core::params::VoiceParameters;

/// Upper bound on rendered harmonics per frame.
const MAX_HARMONICS: usize = 64;
/// Keep harmonics below this fraction of Nyquist.
const HARMONIC_BAND: f64 = 0.95;
/// Overall gain of the noise branch relative to the harmonic branch.
const NOISE_GAIN: f64 = 0.5;
/// Postfilter high-band emphasis amount.
const POSTFILTER_EMPHASIS: f32 = 0.3;

/// Synthesizer parameters.
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Applies a brightness post-equalizer to the rendered audio.
    pub enable_postfilter: bool,
    /// Hard ceiling on rendered duration, seconds.
    pub max_duration_sec: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            enable_postfilter: false,
            max_duration_sec: 60.0,
        }
    }
}

/// Stateful parameter-stream renderer.
///
/// State (oscillator phases, previous frame amplitudes, the noise grain
/// tail) survives across [`synthesize`](Self::synthesize) calls so a
/// stream rendered chunk by chunk equals the one-shot rendering up to
/// the noise realization.
pub struct Synthesizer {
    cfg: SynthesisConfig,
    phases: Vec<f64>,
    prev_amps: Vec<f64>,
    prev_f0: f64,
    /// Grain overlap carried into the next call.
    noise_tail: Vec<f64>,
    /// xorshift64 state for the noise phases; seeded for reproducibility.
    rng: u64,
    /// One-sample memory of the postfilter.
    post_state: f32,
    fft: Option<Fft64>,
}

impl Synthesizer {
    /// Creates a synthesizer with cleared state.
    pub fn new(cfg: SynthesisConfig) -> Self {
        Self {
            cfg,
            phases: vec![0.0; MAX_HARMONICS],
            prev_amps: vec![0.0; MAX_HARMONICS],
            prev_f0: 0.0,
            noise_tail: Vec::new(),
            rng: 0x6A09_E667_F3BC_C909,
            post_state: 0.0,
            fft: None,
        }
    }

    /// Clears all inter-call state.
    pub fn reset(&mut self) {
        self.phases.fill(0.0);
        self.prev_amps.fill(0.0);
        self.prev_f0 = 0.0;
        self.noise_tail.clear();
        self.post_state = 0.0;
        self.rng = 0x6A09_E667_F3BC_C909;
    }

    /// Renders a parameter stream to PCM.
    ///
    /// Produces `frame_count × hop` samples where
    /// `hop = round(frame_period_ms / 1000 · sample_rate)`.
    pub fn synthesize(&mut self, params: &VoiceParameters) -> Result<Vec<f32>> {
        params.validate()?;
        let rate = f64::from(params.sample_rate);
        if rate <= 0.0 {
            return Err(EngineError::new(
                ErrorKind::InvalidArgument,
                "parameters carry a zero sample rate",
            ));
        }
        let hop = (params.frame_period_ms / 1000.0 * rate).round() as usize;
        if hop == 0 {
            return Err(EngineError::new(
                ErrorKind::InvalidArgument,
                "frame period shorter than one sample",
            ));
        }
        let frames = params.frame_count();
        let n_out = frames * hop;
        if n_out as f64 / rate > self.cfg.max_duration_sec {
            return Err(EngineError::new(
                ErrorKind::SynthesisBufferOverflow,
                format!(
                    "rendering {frames} frames ({:.2} s) exceeds the {:.2} s limit",
                    n_out as f64 / rate,
                    self.cfg.max_duration_sec
                ),
            ));
        }

        let fft_size = params.fft_size;
        let mut out = vec![0.0f64; n_out + fft_size];

        // Grain overlap from the previous call.
        for (i, &v) in self.noise_tail.iter().enumerate() {
            if i < out.len() {
                out[i] += v;
            }
        }

        self.render_harmonics(params, hop, &mut out[..n_out]);
        self.render_noise(params, hop, &mut out)?;

        // Save the tail beyond this call's output for the next chunk.
        self.noise_tail = out[n_out..].to_vec();

        let mut pcm: Vec<f32> = out[..n_out].iter().map(|&x| x as f32).collect();
        if self.cfg.enable_postfilter {
            self.postfilter(&mut pcm);
        }
        Ok(pcm)
    }

    /// Oscillator bank with per-frame amplitude targets and linear
    /// interpolation over the hop.
    fn render_harmonics(&mut self, params: &VoiceParameters, hop: usize, out: &mut [f64]) {
        let rate = f64::from(params.sample_rate);
        let bins = params.spectrum_bins();
        let bin_width = rate / params.fft_size as f64;

        for frame in 0..params.frame_count() {
            let f0 = params.f0[frame];
            let env = params.spectrum.row(frame);
            let ap = params.aperiodicity.row(frame);

            let mut target = [0.0f64; MAX_HARMONICS];
            if f0 > 0.0 {
                let count = ((rate / 2.0 * HARMONIC_BAND / f0) as usize).min(MAX_HARMONICS);
                for h in 0..count {
                    let freq = f0 * (h + 1) as f64;
                    let bin = ((freq / bin_width).round() as usize).min(bins - 1);
                    target[h] = (env[bin] * (1.0 - ap[bin])).max(0.0).sqrt();
                }
            }

            // Unvoiced-to-voiced onset: restart phases so the attack is
            // clean instead of resuming stale phase.
            if self.prev_f0 <= 0.0 && f0 > 0.0 {
                self.phases.fill(0.0);
            }
            let f0_start = if self.prev_f0 > 0.0 { self.prev_f0 } else { f0 };
            let start = frame * hop;
            let len = hop.min(out.len().saturating_sub(start));

            for n in 0..len {
                let t = n as f64 / hop as f64;
                let inst_f0 = if f0 > 0.0 {
                    f0_start + (f0 - f0_start) * t
                } else {
                    0.0
                };
                let mut acc = 0.0f64;
                for h in 0..MAX_HARMONICS {
                    let amp = self.prev_amps[h] + (target[h] - self.prev_amps[h]) * t;
                    if amp > 0.0 || self.prev_amps[h] > 0.0 {
                        acc += amp * f64::from(voz_core::fast_sin(self.phases[h] as f32));
                    }
                    if inst_f0 > 0.0 {
                        // Wrap every update: the f32 sine argument needs
                        // the phase to stay small.
                        self.phases[h] = (self.phases[h] + TAU * inst_f0 * (h + 1) as f64 / rate) % TAU;
                    }
                }
                out[start + n] += acc;
            }

            self.prev_amps.copy_from_slice(&target);
            self.prev_f0 = f0;
        }
    }

    /// Random-phase inverse-FFT grains shaped by `envelope ·
    /// aperiodicity`, overlap-added at the frame hop.
    fn render_noise(&mut self, params: &VoiceParameters, hop: usize, out: &mut [f64]) -> Result<()> {
        let fft_size = params.fft_size;
        if self.fft.as_ref().map(|f| f.size()) != Some(fft_size) {
            self.fft = Some(Fft64::new(fft_size));
        }
        let fft = self.fft.as_ref().expect("fft just installed");
        let bins = params.spectrum_bins();
        let window = Window::Hann.coefficients(fft_size);
        // Hann windows at this hop overlap ~fft_size/(2·hop) deep.
        let ola_norm = (2.0 * hop as f64 / fft_size as f64).min(1.0);
        let mut rng = self.rng;

        let mut half = vec![rustfft::num_complex::Complex::new(0.0f64, 0.0f64); bins];
        for frame in 0..params.frame_count() {
            let env = params.spectrum.row(frame);
            let ap = params.aperiodicity.row(frame);

            for k in 0..bins {
                let mag = (env[k] * ap[k]).max(0.0).sqrt() * NOISE_GAIN;
                let phase = xorshift_phase(&mut rng);
                half[k] = rustfft::num_complex::Complex::from_polar(mag, phase);
            }
            half[0].im = 0.0;
            half[bins - 1].im = 0.0;

            let grain = fft.inverse_real(&half);
            let center = frame * hop;
            // Grain is laid out forward from the frame start; the tail
            // beyond this call's range lands in the carry region.
            for (j, (&g, &w)) in grain.iter().zip(&window).enumerate() {
                let idx = center + j;
                if idx < out.len() {
                    out[idx] += g * w * ola_norm;
                }
            }
        }
        self.rng = rng;
        Ok(())
    }

    /// Brightness post-equalizer: dry plus scaled first difference.
    fn postfilter(&mut self, pcm: &mut [f32]) {
        let mut prev = self.post_state;
        for x in pcm.iter_mut() {
            let dry = *x;
            *x = dry + POSTFILTER_EMPHASIS * (dry - prev);
            prev = dry;
        }
        self.post_state = prev;
    }
}

fn xorshift_phase(rng: &mut u64) -> f64 {
    *rng ^= *rng << 13;
    *rng ^= *rng >> 7;
    *rng ^= *rng << 17;
    (*rng >> 11) as f64 / (1u64 << 53) as f64 * TAU
}
