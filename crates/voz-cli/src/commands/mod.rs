//! CLI subcommands.

pub mod analyze;
pub mod render;
pub mod stream;

use anyhow::Context;
use std::path::PathBuf;
use voz_config::PipelineConfig;

/// Loads the pipeline config from a TOML file, or the defaults.
pub fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PipelineConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            PipelineConfig::from_toml(&text)?
        }
        None => PipelineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}
