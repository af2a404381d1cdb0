//! Block adapters wrapping the analysis/synthesis algorithms.
//!
//! Each adapter implements [`Processor`](voz_graph::Processor) with the
//! canonical port signature of its stage and stays self-contained: no
//! adapter touches another block or the scheduler. The pipeline reaches
//! the endpoints (PCM in, PCM out) through shared handles
//! ([`AudioSource`], [`AudioSink`]) rather than by downcasting
//! processors.

mod aperiodicity;
mod audio_input;
mod audio_output;
mod f0_extraction;
mod parameter_merge;
mod spectrum_analysis;
mod synthesis;

pub use aperiodicity::AperiodicityBlock;
pub use audio_input::{AudioInputBlock, AudioSource};
pub use audio_output::{AudioOutputBlock, AudioSink};
pub use f0_extraction::F0ExtractionBlock;
pub use parameter_merge::ParameterMergeBlock;
pub use spectrum_analysis::SpectrumAnalysisBlock;
pub use synthesis::SynthesisBlock;
