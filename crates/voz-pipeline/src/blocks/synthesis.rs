//! Synthesis block.

use voz_core::error::{EngineError, ErrorKind, Result};
use voz_graph::{Block, BlockKind, InitContext, Port, PortDirection, PortType, ProcessIo, Processor};
use voz_synth::Synthesizer;

/// Synthesis: 1 in (parameters), 1 out (audio).
///
/// Renders `frame_count × hop` samples per pass. The synthesizer's phase
/// and grain state persists across passes, so chunked streaming output
/// stays sample-continuous.
pub struct SynthesisBlock {
    synth: Synthesizer,
}

impl SynthesisBlock {
    /// Builds the block with room for `sample_capacity` output samples.
    pub fn build(name: &str, sample_capacity: usize, synth: Synthesizer) -> Result<Block> {
        Block::new(
            name,
            BlockKind::Synthesis,
            vec![Port::new(
                "parameters",
                PortDirection::Input,
                PortType::Parameters,
                1,
            )],
            vec![Port::new(
                "audio",
                PortDirection::Output,
                PortType::Audio,
                sample_capacity,
            )],
            Box::new(Self { synth }),
        )
    }
}

impl Processor for SynthesisBlock {
    fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<()> {
        Ok(())
    }

    fn process(&mut self, io: &mut ProcessIo<'_>, _frame_count: usize) -> Result<()> {
        let params = io.input(0)?.as_params()?;
        let rendered = self.synth.synthesize(params)?;

        let out = io.output_audio(0)?;
        if rendered.len() > out.len() {
            return Err(EngineError::new(
                ErrorKind::SynthesisBufferOverflow,
                format!(
                    "rendered {} samples into a {}-sample port buffer",
                    rendered.len(),
                    out.len()
                ),
            ));
        }
        out[..rendered.len()].copy_from_slice(&rendered);
        out[rendered.len()..].fill(0.0);
        Ok(())
    }

    fn cleanup(&mut self) {
        self.synth.reset();
    }
}
