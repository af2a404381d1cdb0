//! UTAU-style note parameters.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, ConfigResult};

/// One note render request from the host.
///
/// The engine core only needs the sample rate, samples, target pitch, and
/// pitch-bend vector; everything else is front-end timing and dynamics
/// carried through for the output stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteParams {
    /// Source vocal WAV; `None` when the host supplies samples directly.
    pub input_wav: Option<PathBuf>,
    /// Rendered WAV destination; `None` skips file output.
    pub output_wav: Option<PathBuf>,
    /// Target pitch in Hz; 0 preserves the source pitch.
    pub target_pitch: f64,
    /// Note velocity in [0, 1].
    pub velocity: f64,
    /// Output volume in [0, 1].
    pub volume: f64,
    /// Pitch modulation depth in [0, 1]: 0 = flat target pitch, 1 =
    /// follow the source contour fully.
    pub modulation: f64,
    /// Optional pitch-bend curve in semitones, resampled over the note.
    pub pitch_bend: Vec<f32>,
    /// Consonant velocity in [0, 1].
    pub consonant_velocity: f64,
    /// Pre-utterance offset in milliseconds.
    pub pre_utterance_ms: f64,
    /// Crossfade overlap in milliseconds.
    pub overlap_ms: f64,
    /// Start offset into the source in milliseconds.
    pub start_point_ms: f64,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output bit depth: 16, 24, or 32.
    pub bit_depth: u16,
    /// Allow the host cache to reuse this render.
    pub enable_cache: bool,
    /// Verbose per-note logging.
    pub verbose: bool,
}

impl Default for NoteParams {
    fn default() -> Self {
        Self {
            input_wav: None,
            output_wav: None,
            target_pitch: 0.0,
            velocity: 1.0,
            volume: 1.0,
            modulation: 0.0,
            pitch_bend: Vec::new(),
            consonant_velocity: 1.0,
            pre_utterance_ms: 0.0,
            overlap_ms: 0.0,
            start_point_ms: 0.0,
            sample_rate: 44100,
            bit_depth: 16,
            enable_cache: false,
            verbose: false,
        }
    }
}

impl NoteParams {
    /// Checks every field against its documented range.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.target_pitch < 0.0 || self.target_pitch > 4000.0 {
            return Err(ConfigError::OutOfRange {
                field: "note.target_pitch",
                value: self.target_pitch,
                min: 0.0,
                max: 4000.0,
            });
        }
        unit("note.velocity", self.velocity)?;
        unit("note.volume", self.volume)?;
        unit("note.modulation", self.modulation)?;
        unit("note.consonant_velocity", self.consonant_velocity)?;
        for (i, &bend) in self.pitch_bend.iter().enumerate() {
            if !bend.is_finite() || bend.abs() > 48.0 {
                return Err(ConfigError::Invalid {
                    field: "note.pitch_bend",
                    reason: format!("entry {i} = {bend} outside ±48 semitones"),
                });
            }
        }
        if self.pre_utterance_ms < 0.0 || self.overlap_ms < 0.0 || self.start_point_ms < 0.0 {
            return Err(ConfigError::Invalid {
                field: "note.timing",
                reason: "pre-utterance, overlap, and start point must be non-negative".into(),
            });
        }
        if !(8000..=96000).contains(&self.sample_rate) {
            return Err(ConfigError::OutOfRange {
                field: "note.sample_rate",
                value: f64::from(self.sample_rate),
                min: 8000.0,
                max: 96000.0,
            });
        }
        if !matches!(self.bit_depth, 16 | 24 | 32) {
            return Err(ConfigError::Invalid {
                field: "note.bit_depth",
                reason: format!("must be 16, 24, or 32, got {}", self.bit_depth),
            });
        }
        Ok(())
    }

    /// Pitch-bend offset in semitones at normalized note position
    /// `t ∈ [0, 1]`, linearly interpolated over the curve.
    pub fn bend_at(&self, t: f64) -> f64 {
        if self.pitch_bend.is_empty() {
            return 0.0;
        }
        if self.pitch_bend.len() == 1 {
            return f64::from(self.pitch_bend[0]);
        }
        let pos = t.clamp(0.0, 1.0) * (self.pitch_bend.len() - 1) as f64;
        let idx = (pos as usize).min(self.pitch_bend.len() - 2);
        let frac = pos - idx as f64;
        f64::from(self.pitch_bend[idx]) * (1.0 - frac) + f64::from(self.pitch_bend[idx + 1]) * frac
    }
}

fn unit(field: &'static str, value: f64) -> ConfigResult<()> {
    if !(0.0..=1.0).contains(&value) || !value.is_finite() {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(NoteParams::default().validate().is_ok());
    }

    #[test]
    fn unit_fields_bounded() {
        for field in ["velocity", "volume", "modulation"] {
            let mut p = NoteParams::default();
            match field {
                "velocity" => p.velocity = 1.5,
                "volume" => p.volume = -0.1,
                _ => p.modulation = 2.0,
            }
            assert!(p.validate().is_err(), "{field} accepted out of range");
        }
    }

    #[test]
    fn bit_depth_whitelist() {
        let mut p = NoteParams::default();
        for ok in [16, 24, 32] {
            p.bit_depth = ok;
            assert!(p.validate().is_ok());
        }
        p.bit_depth = 20;
        assert!(p.validate().is_err());
    }

    #[test]
    fn pitch_bend_entries_bounded() {
        let mut p = NoteParams::default();
        p.pitch_bend = vec![0.0, 2.0, -2.0];
        assert!(p.validate().is_ok());
        p.pitch_bend = vec![0.0, 100.0];
        assert!(p.validate().is_err());
        p.pitch_bend = vec![f32::NAN];
        assert!(p.validate().is_err());
    }

    #[test]
    fn bend_interpolation() {
        let p = NoteParams {
            pitch_bend: vec![0.0, 2.0],
            ..NoteParams::default()
        };
        assert!((p.bend_at(0.0) - 0.0).abs() < 1e-9);
        assert!((p.bend_at(0.5) - 1.0).abs() < 1e-9);
        assert!((p.bend_at(1.0) - 2.0).abs() < 1e-9);
        assert!((p.bend_at(2.0) - 2.0).abs() < 1e-9); // clamped

        let flat = NoteParams::default();
        assert_eq!(flat.bend_at(0.3), 0.0);
    }
}
