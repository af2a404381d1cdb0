//! Parameter merge block.

use voz_config::NoteParams;
use voz_core::error::{EngineError, ErrorKind, Result};
use voz_core::params::{ParamMatrix, VoiceParameters};
use voz_graph::{Block, BlockKind, InitContext, Port, PortDirection, PortType, ProcessIo, Processor};

/// Pitch plan derived from the note parameters.
///
/// For voiced frames the output F0 is
/// `base · 2^(bend(t)/12)` where `base` is the target pitch shaped by the
/// modulation depth: 0 renders the note flat at the target, 1 follows the
/// source contour's deviation from its own median. A zero target pitch
/// preserves the source F0.
#[derive(Debug, Clone)]
struct PitchPlan {
    target_pitch: f64,
    modulation: f64,
    pitch_bend: Vec<f32>,
}

impl PitchPlan {
    fn from_note(note: &NoteParams) -> Self {
        Self {
            target_pitch: note.target_pitch,
            modulation: note.modulation,
            pitch_bend: note.pitch_bend.clone(),
        }
    }

    fn bend_at(&self, t: f64) -> f64 {
        if self.pitch_bend.is_empty() {
            return 0.0;
        }
        if self.pitch_bend.len() == 1 {
            return f64::from(self.pitch_bend[0]);
        }
        let pos = t.clamp(0.0, 1.0) * (self.pitch_bend.len() - 1) as f64;
        let idx = (pos as usize).min(self.pitch_bend.len() - 2);
        let frac = pos - idx as f64;
        f64::from(self.pitch_bend[idx]) * (1.0 - frac)
            + f64::from(self.pitch_bend[idx + 1]) * frac
    }

    fn apply(&self, f0: &mut [f64]) {
        let voiced_median = median_voiced(f0);
        let frames = f0.len().max(1) as f64;
        for (i, value) in f0.iter_mut().enumerate() {
            if *value <= 0.0 {
                continue;
            }
            let base = if self.target_pitch > 0.0 && voiced_median > 0.0 {
                self.target_pitch * (*value / voiced_median).powf(self.modulation)
            } else {
                *value
            };
            let bend = self.bend_at(i as f64 / (frames - 1.0).max(1.0));
            *value = base * (bend / 12.0).exp2();
        }
    }
}

fn median_voiced(f0: &[f64]) -> f64 {
    let mut voiced: Vec<f64> = f0.iter().copied().filter(|&x| x > 0.0).collect();
    if voiced.is_empty() {
        return 0.0;
    }
    voiced.sort_by(f64::total_cmp);
    voiced[voiced.len() / 2]
}

/// ParameterMerge: 3 in (F0, spectrum, aperiodicity), 1 out (parameters).
///
/// Composes the three streams into one [`VoiceParameters`] aggregate,
/// validating that frame counts and spectrum widths agree, and applies
/// the note's pitch plan to the F0 stream on the way through.
pub struct ParameterMergeBlock {
    plan: PitchPlan,
    sample_rate: u32,
    frame_period_ms: f64,
    fft_size: usize,
}

impl ParameterMergeBlock {
    /// Builds the block for `frame_capacity` frames of `bins` bins.
    pub fn build(
        name: &str,
        frame_capacity: usize,
        bins: usize,
        note: &NoteParams,
        sample_rate: u32,
        frame_period_ms: f64,
        fft_size: usize,
    ) -> Result<Block> {
        Block::new(
            name,
            BlockKind::ParameterMerge,
            vec![
                Port::new("f0", PortDirection::Input, PortType::F0, frame_capacity),
                Port::matrix(
                    "spectrum",
                    PortDirection::Input,
                    PortType::Spectrum,
                    frame_capacity,
                    bins,
                ),
                Port::matrix(
                    "aperiodicity",
                    PortDirection::Input,
                    PortType::Aperiodicity,
                    frame_capacity,
                    bins,
                ),
            ],
            vec![Port::new(
                "parameters",
                PortDirection::Output,
                PortType::Parameters,
                1,
            )],
            Box::new(Self {
                plan: PitchPlan::from_note(note),
                sample_rate,
                frame_period_ms,
                fft_size,
            }),
        )
    }
}

impl Processor for ParameterMergeBlock {
    fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<()> {
        Ok(())
    }

    fn process(&mut self, io: &mut ProcessIo<'_>, _frame_count: usize) -> Result<()> {
        let mut f0 = io.input_f0(0)?.to_vec();
        let spectrum_in = io.input(1)?.as_spectrum()?;
        let ap_in = io.input(2)?.as_aperiodicity()?;

        let frames = f0.len();
        let bins = self.fft_size / 2 + 1;
        if spectrum_in.rows() != frames || ap_in.rows() != frames {
            return Err(EngineError::new(
                ErrorKind::ParameterMismatch,
                format!(
                    "stream frame counts disagree: f0 {frames}, spectrum {}, aperiodicity {}",
                    spectrum_in.rows(),
                    ap_in.rows()
                ),
            ));
        }
        if spectrum_in.cols() != bins || ap_in.cols() != bins {
            return Err(EngineError::new(
                ErrorKind::ParameterMismatch,
                format!(
                    "bin counts disagree with fft_size {}: spectrum {}, aperiodicity {}",
                    self.fft_size,
                    spectrum_in.cols(),
                    ap_in.cols()
                ),
            ));
        }

        self.plan.apply(&mut f0);

        let mut spectrum = ParamMatrix::new(frames, bins);
        let mut aperiodicity = ParamMatrix::new(frames, bins);
        for r in 0..frames {
            spectrum.row_mut(r).copy_from_slice(spectrum_in.row(r));
            aperiodicity.row_mut(r).copy_from_slice(ap_in.row(r));
        }

        let hop_s = self.frame_period_ms / 1000.0;
        let params = VoiceParameters {
            time_axis: (0..frames).map(|i| i as f64 * hop_s).collect(),
            f0,
            spectrum,
            aperiodicity,
            fft_size: self.fft_size,
            sample_rate: self.sample_rate,
            frame_period_ms: self.frame_period_ms,
        };
        params.validate()?;

        *io.output(0)?.as_params_mut()? = params;
        Ok(())
    }

    fn cleanup(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_target_with_zero_modulation() {
        let plan = PitchPlan {
            target_pitch: 440.0,
            modulation: 0.0,
            pitch_bend: vec![],
        };
        let mut f0 = vec![200.0, 0.0, 210.0, 190.0];
        plan.apply(&mut f0);
        assert!((f0[0] - 440.0).abs() < 1e-9);
        assert_eq!(f0[1], 0.0); // unvoiced stays unvoiced
        assert!((f0[2] - 440.0).abs() < 1e-9);
    }

    #[test]
    fn full_modulation_follows_contour() {
        let plan = PitchPlan {
            target_pitch: 440.0,
            modulation: 1.0,
            pitch_bend: vec![],
        };
        let mut f0 = vec![100.0, 200.0, 400.0];
        plan.apply(&mut f0);
        // Median is 200; deviations carry through fully.
        assert!((f0[0] - 220.0).abs() < 1e-6);
        assert!((f0[1] - 440.0).abs() < 1e-6);
        assert!((f0[2] - 880.0).abs() < 1e-6);
    }

    #[test]
    fn zero_target_preserves_source() {
        let plan = PitchPlan {
            target_pitch: 0.0,
            modulation: 0.0,
            pitch_bend: vec![],
        };
        let mut f0 = vec![123.0, 321.0];
        plan.apply(&mut f0);
        assert_eq!(f0, vec![123.0, 321.0]);
    }

    #[test]
    fn bend_shifts_by_semitones() {
        let plan = PitchPlan {
            target_pitch: 440.0,
            modulation: 0.0,
            pitch_bend: vec![12.0, 12.0],
        };
        let mut f0 = vec![200.0, 200.0];
        plan.apply(&mut f0);
        assert!((f0[0] - 880.0).abs() < 1e-6);
        assert!((f0[1] - 880.0).abs() < 1e-6);
    }
}
