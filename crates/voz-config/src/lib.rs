//! Voz Config - pipeline configuration and note parameters.
//!
//! [`PipelineConfig`] is the complete knob surface of the engine, grouped
//! into sections that serialize to/from TOML. Validation is explicit and
//! field-by-field: [`PipelineConfig::validate`] must pass before a
//! pipeline will accept the config, and every violation names the field
//! and its documented range.
//!
//! [`NoteParams`] carries the UTAU-style note request (paths, pitch,
//! dynamics, timing) consumed by the pipeline front end.

mod config;
mod note;

pub use config::{
    AperiodicityConfig, AudioConfig, DebugConfig, F0Config, MemoryConfig, OptimizationConfig,
    PerformanceConfig, PipelineConfig, SpectrumConfig, SynthesisConfig,
};
pub use note::NoteParams;

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A numeric field is outside its documented range.
    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Dotted field path, e.g. `audio.sample_rate`.
        field: &'static str,
        /// The offending value.
        value: f64,
        /// Minimum allowed value.
        min: f64,
        /// Maximum allowed value.
        max: f64,
    },

    /// A field violates a non-range constraint.
    #[error("{field}: {reason}")]
    Invalid {
        /// Dotted field path.
        field: &'static str,
        /// What the constraint is.
        reason: String,
    },
}

/// Result alias for validation.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
