//! Band aperiodicity block.

use voz_analysis::AperiodicityAnalyzer;
use voz_core::Result;
use voz_graph::{Block, BlockKind, InitContext, Port, PortDirection, PortType, ProcessIo, Processor};

/// AperiodicityAnalysis: 2 in (audio, F0), 1 out (aperiodicity rows).
pub struct AperiodicityBlock {
    analyzer: AperiodicityAnalyzer,
}

impl AperiodicityBlock {
    /// Builds the block; the output matrix is `frame_capacity` rows of
    /// the analyzer's bin count.
    pub fn build(
        name: &str,
        sample_capacity: usize,
        frame_capacity: usize,
        analyzer: AperiodicityAnalyzer,
    ) -> Result<Block> {
        let bins = analyzer.bins();
        Block::new(
            name,
            BlockKind::AperiodicityAnalysis,
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
                "aperiodicity",
                PortDirection::Output,
                PortType::Aperiodicity,
                frame_capacity,
                bins,
            )],
            Box::new(Self { analyzer }),
        )
    }
}

impl Processor for AperiodicityBlock {
    fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<()> {
        Ok(())
    }

    fn process(&mut self, io: &mut ProcessIo<'_>, frame_count: usize) -> Result<()> {
        let f0 = io.input_f0(1)?.to_vec();
        let audio = io.input_audio(0)?;
        let n = frame_count.min(audio.len());
        let ap = self.analyzer.analyze(&audio[..n], &f0);

        let out = io.output(0)?.as_aperiodicity_mut()?;
        let rows = ap.rows().min(out.rows());
        for r in 0..rows {
            out.row_mut(r).copy_from_slice(ap.row(r));
        }
        Ok(())
    }

    fn cleanup(&mut self) {}
}
