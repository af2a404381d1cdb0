//! The pipeline configuration surface.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, ConfigResult};

/// Audio format settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz; 8000–96000.
    pub sample_rate: u32,
    /// Processing frame size in samples; 64–16384.
    pub frame_size: usize,
    /// Channel count; this engine is monophonic.
    pub channel_count: u16,
    /// Streaming chunk size in samples.
    pub buffer_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            frame_size: 1024,
            channel_count: 1,
            buffer_size: 1024,
        }
    }
}

/// F0 extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct F0Config {
    /// Inter-frame interval in milliseconds.
    pub frame_period_ms: f64,
    /// Lowest admissible F0 in Hz; at least 40.
    pub f0_floor: f64,
    /// Highest admissible F0 in Hz; at most 1100.
    pub f0_ceil: f64,
    /// 0 = periodicity search, 1 = autocorrelation variant.
    pub algorithm: u32,
}

impl Default for F0Config {
    fn default() -> Self {
        Self {
            frame_period_ms: 5.0,
            f0_floor: 70.0,
            f0_ceil: 800.0,
            algorithm: 0,
        }
    }
}

/// Spectral envelope settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    /// Smoothing compensation coefficient.
    pub q1: f64,
    /// FFT length; a power of two, at least 512.
    pub fft_size: usize,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            q1: -0.15,
            fft_size: 2048,
        }
    }
}

/// Band aperiodicity settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AperiodicityConfig {
    /// Periodicity acceptance threshold in [0, 1].
    pub threshold: f64,
}

impl Default for AperiodicityConfig {
    fn default() -> Self {
        Self { threshold: 0.85 }
    }
}

/// Synthesis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Applies the brightness post-equalizer.
    pub enable_postfilter: bool,
    /// Hard ceiling on rendered duration in seconds.
    pub max_duration_sec: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            enable_postfilter: false,
            max_duration_sec: 60.0,
        }
    }
}

/// Executor and kernel tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Fuse adjacent blocks where the executor supports it.
    pub enable_node_fusion: bool,
    /// Reuse arena blocks through the free list.
    pub enable_memory_reuse: bool,
    /// Use the SIMD kernel dispatch (scalar kernels otherwise).
    pub enable_simd: bool,
    /// Fan out independent blocks onto worker threads.
    pub enable_parallel_execution: bool,
    /// Worker thread bound; 0 = auto.
    pub max_thread_count: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            enable_node_fusion: false,
            enable_memory_reuse: true,
            enable_simd: true,
            enable_parallel_execution: false,
            max_thread_count: 0,
        }
    }
}

/// Memory pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Arena capacity in bytes.
    pub memory_pool_size: usize,
    /// Track per-stage memory in the monitor.
    pub enable_memory_tracking: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            memory_pool_size: 64 * 1024 * 1024,
            enable_memory_tracking: true,
        }
    }
}

/// Profiling settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Master switch for the performance monitor.
    pub enable_profiling: bool,
    /// Record per-stage wall-clock timing.
    pub enable_timing_analysis: bool,
    /// Record per-stage memory figures.
    pub enable_memory_profiling: bool,
    /// Record per-stage CPU ratios.
    pub enable_cpu_profiling: bool,
    /// Directory for CSV/text reports; empty = no file output.
    pub profile_output_dir: String,
    /// Async/streaming watchdog in seconds; 0 disables it.
    pub timeout_seconds: f64,
}

/// Debug output settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Write state dumps and DOT exports.
    pub enable_debug_output: bool,
    /// Directory for debug artifacts; empty = current directory.
    pub debug_output_dir: String,
    /// Emit verbose lifecycle logs.
    pub enable_verbose_logging: bool,
}

/// The complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Audio format settings.
    pub audio: AudioConfig,
    /// F0 extraction settings.
    pub f0: F0Config,
    /// Spectral envelope settings.
    pub spectrum: SpectrumConfig,
    /// Band aperiodicity settings.
    pub aperiodicity: AperiodicityConfig,
    /// Synthesis settings.
    pub synthesis: SynthesisConfig,
    /// Executor and kernel tuning.
    pub optimization: OptimizationConfig,
    /// Memory pool settings.
    pub memory: MemoryConfig,
    /// Profiling settings.
    pub performance: PerformanceConfig,
    /// Debug output settings.
    pub debug: DebugConfig,
}

impl PipelineConfig {
    /// Checks every field against its documented range.
    ///
    /// Validation is direct, one check per field; nothing recurses.
    pub fn validate(&self) -> ConfigResult<()> {
        range(
            "audio.sample_rate",
            f64::from(self.audio.sample_rate),
            8000.0,
            96000.0,
        )?;
        range(
            "audio.frame_size",
            self.audio.frame_size as f64,
            64.0,
            16384.0,
        )?;
        if self.audio.channel_count != 1 {
            return Err(ConfigError::Invalid {
                field: "audio.channel_count",
                reason: format!("engine is monophonic, got {}", self.audio.channel_count),
            });
        }
        if self.audio.buffer_size == 0 {
            return Err(ConfigError::Invalid {
                field: "audio.buffer_size",
                reason: "must be non-zero".into(),
            });
        }

        range("f0.frame_period_ms", self.f0.frame_period_ms, 1.0, 100.0)?;
        range("f0.f0_floor", self.f0.f0_floor, 40.0, 1100.0)?;
        range("f0.f0_ceil", self.f0.f0_ceil, 40.0, 1100.0)?;
        if self.f0.f0_floor >= self.f0.f0_ceil {
            return Err(ConfigError::Invalid {
                field: "f0.f0_floor",
                reason: format!(
                    "floor {} must be below ceil {}",
                    self.f0.f0_floor, self.f0.f0_ceil
                ),
            });
        }
        if self.f0.algorithm > 1 {
            return Err(ConfigError::Invalid {
                field: "f0.algorithm",
                reason: format!("must be 0 or 1, got {}", self.f0.algorithm),
            });
        }

        range("spectrum.q1", self.spectrum.q1, -1.0, 1.0)?;
        if !self.spectrum.fft_size.is_power_of_two() || self.spectrum.fft_size < 512 {
            return Err(ConfigError::Invalid {
                field: "spectrum.fft_size",
                reason: format!(
                    "must be a power of two >= 512, got {}",
                    self.spectrum.fft_size
                ),
            });
        }

        range(
            "aperiodicity.threshold",
            self.aperiodicity.threshold,
            0.0,
            1.0,
        )?;

        range(
            "synthesis.max_duration_sec",
            self.synthesis.max_duration_sec,
            0.1,
            3600.0,
        )?;

        range(
            "performance.timeout_seconds",
            self.performance.timeout_seconds,
            0.0,
            3600.0,
        )?;

        if self.optimization.max_thread_count > 1024 {
            return Err(ConfigError::Invalid {
                field: "optimization.max_thread_count",
                reason: format!("{} threads is unreasonable", self.optimization.max_thread_count),
            });
        }

        // Enough for the port buffers of a few seconds of audio.
        range(
            "memory.memory_pool_size",
            self.memory.memory_pool_size as f64,
            1024.0 * 1024.0,
            16.0 * 1024.0 * 1024.0 * 1024.0,
        )?;

        Ok(())
    }

    /// Parses a TOML config file.
    pub fn from_toml(text: &str) -> ConfigResult<Self> {
        toml::from_str(text).map_err(|e| ConfigError::Invalid {
            field: "config",
            reason: e.to_string(),
        })
    }

    /// Serializes to TOML.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

fn range(field: &'static str, value: f64, min: f64, max: f64) -> ConfigResult<()> {
    if value < min || value > max || !value.is_finite() {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn sample_rate_bounds() {
        let mut cfg = PipelineConfig::default();
        cfg.audio.sample_rate = 7999;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::OutOfRange { field: "audio.sample_rate", .. })
        ));
        cfg.audio.sample_rate = 96000;
        assert!(cfg.validate().is_ok());
        cfg.audio.sample_rate = 96001;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn f0_range_consistency() {
        let mut cfg = PipelineConfig::default();
        cfg.f0.f0_floor = 500.0;
        cfg.f0.f0_ceil = 100.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { .. })));

        let mut cfg = PipelineConfig::default();
        cfg.f0.f0_floor = 39.0;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.f0.f0_ceil = 1101.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn fft_size_must_be_power_of_two() {
        let mut cfg = PipelineConfig::default();
        cfg.spectrum.fft_size = 1000;
        assert!(cfg.validate().is_err());
        cfg.spectrum.fft_size = 256; // power of two but below minimum
        assert!(cfg.validate().is_err());
        cfg.spectrum.fft_size = 512;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn aperiodicity_threshold_bounds() {
        let mut cfg = PipelineConfig::default();
        cfg.aperiodicity.threshold = 1.01;
        assert!(cfg.validate().is_err());
        cfg.aperiodicity.threshold = -0.01;
        assert!(cfg.validate().is_err());
        cfg.aperiodicity.threshold = 1.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn channel_count_must_be_mono() {
        let mut cfg = PipelineConfig::default();
        cfg.audio.channel_count = 2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn toml_roundtrip() {
        let cfg = PipelineConfig::default();
        let text = cfg.to_toml();
        let parsed = PipelineConfig::from_toml(&text).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed = PipelineConfig::from_toml(
            "[audio]\nsample_rate = 48000\n\n[spectrum]\nfft_size = 1024\n",
        )
        .unwrap();
        assert_eq!(parsed.audio.sample_rate, 48000);
        assert_eq!(parsed.spectrum.fft_size, 1024);
        assert_eq!(parsed.f0.frame_period_ms, 5.0);
        assert!(parsed.validate().is_ok());
    }
}
