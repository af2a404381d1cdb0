//! F0 extraction block.

use voz_analysis::F0Estimator;
use voz_core::Result;
use voz_graph::{Block, BlockKind, InitContext, Port, PortDirection, PortType, ProcessIo, Processor};

/// F0Extraction: 1 in (audio), 2 out (F0 stream, time axis).
///
/// `process(n)` treats `n` as a sample count and emits one value per
/// frame for the `floor(n / hop) + 1` frames covering it. The time-axis
/// output mirrors the F0 stream's frame grid and may be left dangling by
/// consumers that track time themselves.
pub struct F0ExtractionBlock {
    estimator: F0Estimator,
}

impl F0ExtractionBlock {
    /// Builds the block with `sample_capacity` input samples and
    /// `frame_capacity` output frames.
    pub fn build(
        name: &str,
        sample_capacity: usize,
        frame_capacity: usize,
        estimator: F0Estimator,
    ) -> Result<Block> {
        Block::new(
            name,
            BlockKind::F0Extraction,
            vec![Port::new(
                "audio",
                PortDirection::Input,
                PortType::Audio,
                sample_capacity,
            )],
            vec![
                Port::new("f0", PortDirection::Output, PortType::F0, frame_capacity),
                Port::new(
                    "time_axis",
                    PortDirection::Output,
                    PortType::F0,
                    frame_capacity,
                ),
            ],
            Box::new(Self { estimator }),
        )
    }
}

impl Processor for F0ExtractionBlock {
    fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<()> {
        Ok(())
    }

    fn process(&mut self, io: &mut ProcessIo<'_>, frame_count: usize) -> Result<()> {
        let audio = io.input_audio(0)?;
        let n = frame_count.min(audio.len());
        let (f0, time_axis) = self.estimator.estimate(&audio[..n]);

        let out_f0 = io.output_f0(0)?;
        let frames = f0.len().min(out_f0.len());
        out_f0[..frames].copy_from_slice(&f0[..frames]);
        out_f0[frames..].fill(0.0);

        let out_time = io.output_f0(1)?;
        let frames = time_axis.len().min(out_time.len());
        out_time[..frames].copy_from_slice(&time_axis[..frames]);
        Ok(())
    }

    fn cleanup(&mut self) {}
}
