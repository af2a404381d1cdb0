//! Voz Synth - waveform synthesis from voice parameter streams.
//!
//! The [`Synthesizer`] renders a [`VoiceParameters`] aggregate back into
//! PCM. Voiced energy comes from a bank of phase-continuous harmonic
//! oscillators whose amplitudes follow the spectral envelope weighted by
//! `1 − aperiodicity`; noise energy comes from random-phase inverse-FFT
//! grains shaped by `envelope · aperiodicity`, overlap-added at the frame
//! hop. Oscillator phases and the grain tail persist across calls, so
//! successive chunks of one stream concatenate without discontinuities.

mod synthesizer;

pub use synthesizer::{SynthesisConfig, Synthesizer};
