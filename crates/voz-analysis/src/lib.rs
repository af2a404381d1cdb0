//! Voz Analysis - voice decomposition algorithms.
//!
//! Three analyzers share one frame grid (`frame_count = floor(N/hop) + 1`)
//! and feed the [`VoiceParameters`](voz_core::VoiceParameters) aggregate:
//!
//! - [`F0Estimator`] - fundamental frequency, one `f64` per frame, 0 for
//!   unvoiced frames
//! - [`SpectrumAnalyzer`] - smoothed spectral envelope,
//!   `frame_count × (fft_size/2 + 1)` strictly positive reals
//! - [`AperiodicityAnalyzer`] - per-band noise fraction in `(0, 1]`
//!
//! Supporting pieces: symmetric [`Window`] functions, [`mel`] scale
//! conversions, and an `f64` FFT wrapper ([`Fft64`]).

pub mod aperiodicity;
pub mod f0;
pub mod fft;
pub mod mel;
pub mod spectrum;
pub mod window;

pub use aperiodicity::{AperiodicityAnalyzer, AperiodicityConfig};
pub use f0::{F0Algorithm, F0Config, F0Estimator};
pub use fft::Fft64;
pub use mel::{hz_to_mel, mel_to_hz};
pub use spectrum::{SpectrumAnalyzer, SpectrumConfig};
pub use window::Window;
