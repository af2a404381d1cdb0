//! Voz IO - file interfaces of the engine.
//!
//! - **WAV**: [`read_wav`] / [`write_wav`] for loading input vocals and
//!   emitting rendered audio (canonical RIFF/WAVE, mono; 16/24-bit PCM
//!   or 32-bit float).
//! - **CSV**: [`CsvLog`], the append-only performance log the monitor
//!   writes one row per completed stage.

mod csv;
mod wav;

pub use csv::{CSV_HEADER, CsvLog};
pub use wav::{WavInfo, WavSpec, read_wav, read_wav_info, write_wav};

/// Error types for I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV encode/decode error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Filesystem error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The file's format cannot be processed.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Result alias for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;
