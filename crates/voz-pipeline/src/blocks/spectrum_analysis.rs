//! Spectral envelope block.

use voz_analysis::SpectrumAnalyzer;
use voz_core::Result;
use voz_graph::{Block, BlockKind, InitContext, Port, PortDirection, PortType, ProcessIo, Processor};

/// SpectrumAnalysis: 2 in (audio, F0), 1 out (spectrogram rows).
pub struct SpectrumAnalysisBlock {
    analyzer: SpectrumAnalyzer,
}

impl SpectrumAnalysisBlock {
    /// Builds the block; the output matrix is `frame_capacity` rows of
    /// the analyzer's bin count.
    pub fn build(
        name: &str,
        sample_capacity: usize,
        frame_capacity: usize,
        analyzer: SpectrumAnalyzer,
    ) -> Result<Block> {
        let bins = analyzer.bins();
        Block::new(
            name,
            BlockKind::SpectrumAnalysis,
            vec![
                Port::new(
                    "audio",
                    PortDirection::Input,
                    PortType::Audio,
                    sample_capacity,
                ),
                Port::new("f0", PortDirection::Input, PortType::F0, frame_capacity),
            ],
            vec![Port::matrix(
                "spectrum",
                PortDirection::Output,
                PortType::Spectrum,
                frame_capacity,
                bins,
            )],
            Box::new(Self { analyzer }),
        )
    }
}

impl Processor for SpectrumAnalysisBlock {
    fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<()> {
        Ok(())
    }

    fn process(&mut self, io: &mut ProcessIo<'_>, frame_count: usize) -> Result<()> {
        // The pipeline sizes the F0 buffer to exactly the frame grid of
        // this pass, so its length is the frame count.
        let f0 = io.input_f0(1)?.to_vec();
        let audio = io.input_audio(0)?;
        let n = frame_count.min(audio.len());
        let envelope = self.analyzer.analyze(&audio[..n], &f0);

        let out = io.output(0)?.as_spectrum_mut()?;
        let rows = envelope.rows().min(out.rows());
        for r in 0..rows {
            out.row_mut(r).copy_from_slice(envelope.row(r));
        }
        Ok(())
    }

    fn cleanup(&mut self) {}
}
