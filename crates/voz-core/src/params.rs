//! Shared voice parameter aggregate.
//!
//! [`VoiceParameters`] is the engine's "opaque parameter handle": the three
//! analysis streams (F0, spectral envelope, band aperiodicity) plus the
//! geometry they must agree on. The merge block produces one; the
//! synthesizer consumes one; callers may modify the streams in between for
//! pitch/timbre manipulation.

use crate::error::{EngineError, ErrorKind, Result};

/// Dense row-major `f64` matrix with one row per analysis frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamMatrix {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl ParamMatrix {
    /// Creates a zeroed `rows × cols` matrix.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    /// Wraps an existing row-major buffer.
    ///
    /// Fails with `InvalidArgument` if the length is not `rows × cols`.
    pub fn from_vec(data: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(EngineError::new(
                ErrorKind::InvalidArgument,
                format!("matrix data length {} != {rows}x{cols}", data.len()),
            ));
        }
        Ok(Self { data, rows, cols })
    }

    /// Number of rows (frames).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (frequency bins).
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// One frame's row.
    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// One frame's row, mutable.
    pub fn row_mut(&mut self, r: usize) -> &mut [f64] {
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// The full row-major backing slice.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// The full row-major backing slice, mutable.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

/// The three analysis streams plus their shared geometry.
#[derive(Debug, Clone)]
pub struct VoiceParameters {
    /// Fundamental frequency per frame, Hz; 0 marks unvoiced frames.
    pub f0: Vec<f64>,
    /// Frame center times in seconds, spaced by `frame_period_ms / 1000`.
    pub time_axis: Vec<f64>,
    /// Spectral envelope, `frame_count × (fft_size/2 + 1)`, positive reals.
    pub spectrum: ParamMatrix,
    /// Band aperiodicity, same shape as `spectrum`, values in (0, 1].
    pub aperiodicity: ParamMatrix,
    /// FFT length the spectral streams were computed with.
    pub fft_size: usize,
    /// Sample rate of the analyzed audio, Hz.
    pub sample_rate: u32,
    /// Inter-frame interval in milliseconds.
    pub frame_period_ms: f64,
}

impl VoiceParameters {
    /// Number of analysis frames shared by all three streams.
    pub fn frame_count(&self) -> usize {
        self.f0.len()
    }

    /// Spectrum width implied by the FFT size.
    pub fn spectrum_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Frame count for `samples` samples at `sample_rate` with
    /// `frame_period_ms` spacing: `floor(N / hop) + 1`.
    pub fn frame_count_for(samples: usize, sample_rate: u32, frame_period_ms: f64) -> usize {
        let hop = frame_period_ms * f64::from(sample_rate) / 1000.0;
        (samples as f64 / hop) as usize + 1
    }

    /// Checks that the streams agree on frame count and spectrum width and
    /// that the time axis is monotone.
    pub fn validate(&self) -> Result<()> {
        let frames = self.f0.len();
        let bins = self.spectrum_bins();
        if self.time_axis.len() != frames {
            return Err(EngineError::new(
                ErrorKind::ParameterMismatch,
                format!(
                    "time axis has {} entries for {frames} frames",
                    self.time_axis.len()
                ),
            ));
        }
        if self.spectrum.rows() != frames || self.spectrum.cols() != bins {
            return Err(EngineError::new(
                ErrorKind::ParameterMismatch,
                format!(
                    "spectrum is {}x{}, expected {frames}x{bins}",
                    self.spectrum.rows(),
                    self.spectrum.cols()
                ),
            ));
        }
        if self.aperiodicity.rows() != frames || self.aperiodicity.cols() != bins {
            return Err(EngineError::new(
                ErrorKind::ParameterMismatch,
                format!(
                    "aperiodicity is {}x{}, expected {frames}x{bins}",
                    self.aperiodicity.rows(),
                    self.aperiodicity.cols()
                ),
            ));
        }
        if self.time_axis.windows(2).any(|w| w[1] <= w[0]) {
            return Err(EngineError::new(
                ErrorKind::ParameterMismatch,
                "time axis is not strictly increasing",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_params(frames: usize, fft_size: usize) -> VoiceParameters {
        let bins = fft_size / 2 + 1;
        VoiceParameters {
            f0: vec![120.0; frames],
            time_axis: (0..frames).map(|i| i as f64 * 0.005).collect(),
            spectrum: ParamMatrix::new(frames, bins),
            aperiodicity: ParamMatrix::new(frames, bins),
            fft_size,
            sample_rate: 44100,
            frame_period_ms: 5.0,
        }
    }

    #[test]
    fn frame_count_formula() {
        // 0.5 s at 44.1 kHz with 5 ms frames: floor(22050 / 220.5) + 1.
        assert_eq!(VoiceParameters::frame_count_for(22050, 44100, 5.0), 101);
        assert_eq!(VoiceParameters::frame_count_for(0, 44100, 5.0), 1);
    }

    #[test]
    fn validate_accepts_consistent_streams() {
        assert!(valid_params(10, 1024).validate().is_ok());
    }

    #[test]
    fn validate_rejects_shape_mismatch() {
        let mut p = valid_params(10, 1024);
        p.spectrum = ParamMatrix::new(9, p.spectrum_bins());
        assert_eq!(
            p.validate().unwrap_err().kind(),
            ErrorKind::ParameterMismatch
        );

        let mut p = valid_params(10, 1024);
        p.aperiodicity = ParamMatrix::new(10, 100);
        assert_eq!(
            p.validate().unwrap_err().kind(),
            ErrorKind::ParameterMismatch
        );
    }

    #[test]
    fn validate_rejects_nonmonotone_time_axis() {
        let mut p = valid_params(4, 512);
        p.time_axis[2] = p.time_axis[1];
        assert_eq!(
            p.validate().unwrap_err().kind(),
            ErrorKind::ParameterMismatch
        );
    }

    #[test]
    fn matrix_rows_are_disjoint_views() {
        let mut m = ParamMatrix::new(3, 4);
        m.row_mut(1)[2] = 7.0;
        assert_eq!(m.row(1)[2], 7.0);
        assert_eq!(m.row(0)[2], 0.0);
        assert_eq!(m.as_slice()[1 * 4 + 2], 7.0);
    }
}
