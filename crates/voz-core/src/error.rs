//! Engine-wide error model.
//!
//! Every fallible operation in the engine reports an [`ErrorKind`] — a flat,
//! ordered enumeration whose integer values group kinds into ranges
//! (argument errors, resource errors, I/O, domain, timing, runtime). The
//! ordering is part of the public contract: diagnostic tooling classifies
//! severity from the numeric range rather than from per-kind tables.
//!
//! [`EngineError`] couples a kind with human-readable context. Blocks and
//! the scheduler return `EngineError`; the pipeline records the first one as
//! its `last_error` and transitions to the error state.

use thiserror::Error;

/// Flat, ordered error taxonomy for the whole engine.
///
/// Discriminants are stable and comparable; kinds within one tier are
/// numbered consecutively so range checks classify them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Error)]
#[repr(i32)]
pub enum ErrorKind {
    /// Operation completed. Present so result codes form a total order.
    #[error("success")]
    Success = 0,

    /// A parameter was outside its documented range.
    #[error("invalid argument")]
    InvalidArgument = 1,
    /// The operation is not legal in the object's current state.
    #[error("invalid state")]
    InvalidState = 2,
    /// Malformed input data (file header, parameter text, ...).
    #[error("invalid format")]
    InvalidFormat = 3,

    /// A named entity (block, port, file) does not exist.
    #[error("not found")]
    NotFound = 10,
    /// The operation is recognized but not supported on this build/target.
    #[error("not supported")]
    NotSupported = 11,

    /// Host allocation failed.
    #[error("out of memory")]
    OutOfMemory = 20,
    /// The arena memory pool has no room for the requested allocation.
    #[error("memory pool exhausted")]
    MemoryPoolExhausted = 21,
    /// A port buffer was used before the diagram allocated it.
    #[error("buffer not allocated")]
    BufferNotAllocated = 22,
    /// A bounded resource (queue, thread pool) is at capacity.
    #[error("resource exhausted")]
    ResourceExhausted = 23,

    /// Reading a file failed.
    #[error("file read error")]
    FileRead = 30,
    /// Writing a file failed.
    #[error("file write error")]
    FileWrite = 31,
    /// Other file-system failure.
    #[error("file i/o error")]
    FileIo = 32,

    /// The F0 extractor reported a failure.
    #[error("f0 extraction failed")]
    F0Extraction = 40,
    /// The spectral envelope analyzer reported a failure.
    #[error("spectrum analysis failed")]
    SpectrumAnalysis = 41,
    /// The band aperiodicity analyzer reported a failure.
    #[error("aperiodicity analysis failed")]
    AperiodicityAnalysis = 42,
    /// The synthesizer reported a failure.
    #[error("synthesis failed")]
    Synthesis = 43,
    /// Parameter streams disagree on frame count or spectrum size.
    #[error("parameter mismatch")]
    ParameterMismatch = 44,
    /// Synthesis produced more samples than the output buffer holds.
    #[error("synthesis buffer overflow")]
    SynthesisBufferOverflow = 45,

    /// A configured deadline expired.
    #[error("timeout")]
    Timeout = 50,
    /// A stage exceeded its realtime budget.
    #[error("realtime constraint violated")]
    RealtimeConstraintViolated = 51,
    /// The operation observed the cooperative cancel flag.
    #[error("cancelled")]
    Cancelled = 52,

    /// Diagram validation or topological ordering failed.
    #[error("graph build failed")]
    GraphBuildFailed = 60,
    /// CPU/feature detection or other hardware-level failure.
    #[error("hardware error")]
    Hardware = 61,
    /// Invariant violation inside the engine itself.
    #[error("internal error")]
    Internal = 62,
}

/// Severity tier derived from the kind's numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// No error.
    None = 0,
    /// Caller mistake; retry with corrected input.
    Recoverable = 1,
    /// Resource, I/O, or DSP-stage failure; the pipeline stops cleanly.
    Degraded = 2,
    /// Timing or engine-invariant failure.
    Critical = 3,
}

impl ErrorKind {
    /// Severity tier for this kind.
    pub fn severity(self) -> Severity {
        match self as i32 {
            0 => Severity::None,
            1..=19 => Severity::Recoverable,
            20..=49 => Severity::Degraded,
            _ => Severity::Critical,
        }
    }

    /// Stable numeric code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Whether this kind represents success.
    pub fn is_success(self) -> bool {
        self == ErrorKind::Success
    }
}

/// An [`ErrorKind`] plus human-readable context.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    kind: ErrorKind,
    message: String,
}

impl EngineError {
    /// Creates an error with context.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The error's kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable context string.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Severity tier, forwarded from the kind.
    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }
}

impl From<ErrorKind> for EngineError {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: String::new(),
        }
    }
}

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_ordered() {
        assert!(ErrorKind::Success < ErrorKind::InvalidArgument);
        assert!(ErrorKind::InvalidFormat < ErrorKind::NotFound);
        assert!(ErrorKind::MemoryPoolExhausted < ErrorKind::FileRead);
        assert!(ErrorKind::Synthesis < ErrorKind::Timeout);
        assert!(ErrorKind::Cancelled < ErrorKind::GraphBuildFailed);
    }

    #[test]
    fn severity_tiers_from_ranges() {
        assert_eq!(ErrorKind::Success.severity(), Severity::None);
        assert_eq!(ErrorKind::InvalidArgument.severity(), Severity::Recoverable);
        assert_eq!(ErrorKind::NotSupported.severity(), Severity::Recoverable);
        assert_eq!(ErrorKind::MemoryPoolExhausted.severity(), Severity::Degraded);
        assert_eq!(ErrorKind::FileWrite.severity(), Severity::Degraded);
        assert_eq!(ErrorKind::ParameterMismatch.severity(), Severity::Degraded);
        assert_eq!(ErrorKind::Timeout.severity(), Severity::Critical);
        assert_eq!(ErrorKind::Internal.severity(), Severity::Critical);
    }

    #[test]
    fn display_includes_context() {
        let err = EngineError::new(ErrorKind::InvalidArgument, "sample_rate 7000 below 8000");
        let text = err.to_string();
        assert!(text.contains("invalid argument"));
        assert!(text.contains("7000"));
    }

    #[test]
    fn from_kind_has_empty_message() {
        let err = EngineError::from(ErrorKind::Cancelled);
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(err.message().is_empty());
    }
}
