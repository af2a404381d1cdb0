//! PCM source block.

use std::sync::{Arc, Mutex};

use voz_core::Result;
use voz_graph::{Block, BlockKind, InitContext, Port, PortDirection, PortType, ProcessIo, Processor};

/// Shared handle the pipeline fills with the samples to feed in.
///
/// Replacing the samples resets the read cursor; the block then serves the
/// new buffer on subsequent `process` calls.
#[derive(Clone, Default)]
pub struct AudioSource {
    inner: Arc<Mutex<SourceState>>,
}

#[derive(Default)]
struct SourceState {
    samples: Vec<f32>,
    cursor: usize,
}

impl AudioSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs new input samples and rewinds the cursor.
    pub fn set_samples(&self, samples: Vec<f32>) {
        let mut state = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        state.samples = samples;
        state.cursor = 0;
    }

    /// Samples not yet consumed.
    pub fn remaining(&self) -> usize {
        let state = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        state.samples.len().saturating_sub(state.cursor)
    }
}

/// AudioInput: 0 in, 1 out (audio).
///
/// `process(n)` copies the next `min(n, remaining)` samples from the
/// source, zero-pads the remainder of the request, and advances the
/// cursor.
pub struct AudioInputBlock {
    source: AudioSource,
}

impl AudioInputBlock {
    /// Builds the block and its diagram node.
    pub fn build(name: &str, capacity: usize, source: AudioSource) -> Result<Block> {
        Block::new(
            name,
            BlockKind::AudioInput,
            vec![],
            vec![Port::new(
                "audio",
                PortDirection::Output,
                PortType::Audio,
                capacity,
            )],
            Box::new(Self { source }),
        )
    }
}

impl Processor for AudioInputBlock {
    fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<()> {
        Ok(())
    }

    fn process(&mut self, io: &mut ProcessIo<'_>, frame_count: usize) -> Result<()> {
        let out = io.output_audio(0)?;
        let n = frame_count.min(out.len());
        let mut state = self
            .source
            .inner
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        let available = state.samples.len().saturating_sub(state.cursor);
        let copied = n.min(available);
        out[..copied].copy_from_slice(&state.samples[state.cursor..state.cursor + copied]);
        out[copied..n].fill(0.0);
        state.cursor += copied;
        Ok(())
    }

    fn cleanup(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_samples_then_zero_pads() {
        let source = AudioSource::new();
        source.set_samples(vec![1.0, 2.0, 3.0]);
        let mut block = AudioInputBlock { source: source.clone() };

        let mut arena = test_arena();
        let mut outputs = [voz_graph::PortData::AudioF32(arena.alloc_vec_f32(5).unwrap())];
        let mut io = ProcessIo {
            inputs: &[],
            outputs: &mut outputs,
        };
        block.process(&mut io, 5).unwrap();
        let out = outputs[0].as_audio().unwrap();
        assert_eq!(&out[..3], &[1.0, 2.0, 3.0]);
        assert_eq!(&out[3..], &[0.0, 0.0]);
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn cursor_advances_across_calls() {
        let source = AudioSource::new();
        source.set_samples(vec![1.0, 2.0, 3.0, 4.0]);
        let mut block = AudioInputBlock { source: source.clone() };

        let mut arena = test_arena();
        let mut outputs = [voz_graph::PortData::AudioF32(arena.alloc_vec_f32(2).unwrap())];
        for expected in [[1.0, 2.0], [3.0, 4.0]] {
            let mut io = ProcessIo {
                inputs: &[],
                outputs: &mut outputs,
            };
            block.process(&mut io, 2).unwrap();
            assert_eq!(outputs[0].as_audio().unwrap(), &expected);
        }
        assert_eq!(source.remaining(), 0);
    }

    fn test_arena() -> voz_core::Arena {
        voz_core::Arena::with_capacity(1 << 16).unwrap()
    }
}
