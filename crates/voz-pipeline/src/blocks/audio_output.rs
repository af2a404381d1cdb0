//! PCM sink block.

use std::sync::{Arc, Mutex};

use voz_core::Result;
use voz_graph::{Block, BlockKind, InitContext, Port, PortDirection, PortType, ProcessIo, Processor};

/// Shared handle the pipeline drains rendered samples from.
#[derive(Clone, Default)]
pub struct AudioSink {
    inner: Arc<Mutex<Vec<f32>>>,
}

impl AudioSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes everything collected so far.
    pub fn drain(&self) -> Vec<f32> {
        let mut samples = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::take(&mut *samples)
    }

    /// Samples collected and not yet drained.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Whether the sink holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// AudioOutput: 1 in (audio), 0 out.
///
/// Applies the note volume and appends `emit_count` samples per pass to
/// the sink. Optional WAV emission happens at the pipeline level once the
/// pass completes.
pub struct AudioOutputBlock {
    sink: AudioSink,
    volume: f32,
    use_simd: bool,
    emit_count: usize,
}

impl AudioOutputBlock {
    /// Builds the block consuming up to `sample_capacity` samples and
    /// emitting `emit_count` per pass.
    pub fn build(
        name: &str,
        sample_capacity: usize,
        emit_count: usize,
        volume: f32,
        use_simd: bool,
        sink: AudioSink,
    ) -> Result<Block> {
        Block::new(
            name,
            BlockKind::AudioOutput,
            vec![Port::new(
                "audio",
                PortDirection::Input,
                PortType::Audio,
                sample_capacity,
            )],
            vec![],
            Box::new(Self {
                sink,
                volume,
                use_simd,
                emit_count,
            }),
        )
    }
}

impl Processor for AudioOutputBlock {
    fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<()> {
        Ok(())
    }

    fn process(&mut self, io: &mut ProcessIo<'_>, _frame_count: usize) -> Result<()> {
        let input = io.input_audio(0)?;
        let n = self.emit_count.min(input.len());
        let mut scaled = vec![0.0f32; n];
        if self.use_simd {
            voz_core::vec_scale(&input[..n], self.volume, &mut scaled);
        } else {
            for (out, &x) in scaled.iter_mut().zip(&input[..n]) {
                *out = x * self.volume;
            }
        }
        self.sink
            .inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend_from_slice(&scaled);
        Ok(())
    }

    fn cleanup(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_collects_scaled_samples() {
        let sink = AudioSink::new();
        let mut block = AudioOutputBlock {
            sink: sink.clone(),
            volume: 0.5,
            use_simd: false,
            emit_count: 3,
        };

        let mut arena = voz_core::Arena::with_capacity(1 << 16).unwrap();
        let mut input = arena.alloc_vec_f32(4).unwrap();
        input.as_mut_slice().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        let input_data = voz_graph::PortData::AudioF32(input);

        let inputs = [&input_data];
        let mut io = ProcessIo {
            inputs: &inputs,
            outputs: &mut [],
        };
        block.process(&mut io, 4).unwrap();

        assert_eq!(sink.drain(), vec![0.5, 1.0, 1.5]);
        assert!(sink.is_empty());
    }
}
