//! Voz Pipeline - the engine's orchestrator.
//!
//! [`Pipeline`] owns the arena, the performance [`Monitor`], and the
//! canonical analysis→synthesis diagram:
//!
//! ```text
//! [AudioInput] --audio--> [F0Extraction] --f0----------------------+
//!         \--audio--> [SpectrumAnalysis] --spectrum----------------+
//!         \--audio--> [AperiodicityAnalysis] --aperiodicity--------+
//!                                                                  v
//!                  [ParameterMerge] --params--> [Synthesis] --audio--> [AudioOutput]
//! ```
//!
//! Three execution modes share one pass implementation: one-shot
//! ([`Pipeline::process`]), async ([`Pipeline::process_async`]) on a
//! worker thread with a completion callback, and streaming
//! ([`Pipeline::process_streaming`]) with chunked execution, a bounded
//! SPSC ring, and back-pressure through the chunk callback's return
//! value.

mod blocks;
mod monitor;
mod pipeline;

pub use blocks::{AudioSink, AudioSource};
pub use monitor::{ALL_STAGES, Monitor, MonitorConfig, STAGE_COUNT, Stage, StageStats};
pub use pipeline::{ChunkCallback, CompletionCallback, Pipeline, PipelineState, ProgressCallback};
pub use voz_graph::CancelFlag;
