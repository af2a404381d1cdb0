//! One-shot note rendering.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use voz_config::NoteParams;
use voz_pipeline::Pipeline;

/// Arguments for `voz render`.
#[derive(Args)]
pub struct RenderArgs {
    /// Input vocal WAV
    pub input: PathBuf,

    /// Output WAV
    pub output: PathBuf,

    /// Target pitch in Hz (0 keeps the source pitch)
    #[arg(long, default_value_t = 0.0)]
    pub pitch: f64,

    /// Output volume, 0..1
    #[arg(long, default_value_t = 1.0)]
    pub volume: f64,

    /// Pitch modulation depth, 0..1
    #[arg(long, default_value_t = 0.0)]
    pub modulation: f64,

    /// Pitch-bend curve in semitones, comma separated
    #[arg(long, value_delimiter = ',')]
    pub bend: Vec<f32>,

    /// Output bit depth (16, 24, or 32)
    #[arg(long, default_value_t = 16)]
    pub bit_depth: u16,

    /// Apply the brightness postfilter
    #[arg(long)]
    pub postfilter: bool,

    /// Pipeline config TOML
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the performance summary after rendering
    #[arg(long)]
    pub profile: bool,
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let (samples, spec) =
        voz_io::read_wav(&args.input).with_context(|| format!("loading {}", args.input.display()))?;
    if samples.is_empty() {
        bail!("{} contains no samples", args.input.display());
    }

    let mut config = super::load_config(args.config.as_ref())?;
    config.audio.sample_rate = spec.sample_rate;
    config.synthesis.enable_postfilter = args.postfilter;
    config.validate()?;

    let note = NoteParams {
        input_wav: Some(args.input.clone()),
        output_wav: Some(args.output.clone()),
        target_pitch: args.pitch,
        volume: args.volume,
        modulation: args.modulation,
        pitch_bend: args.bend.clone(),
        sample_rate: spec.sample_rate,
        bit_depth: args.bit_depth,
        ..NoteParams::default()
    };

    let mut pipeline = Pipeline::new(config)?;
    pipeline.initialize()?;

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {percent}% {msg}")
            .expect("static template"),
    );
    {
        let bar = bar.clone();
        pipeline.set_progress_callback(Arc::new(move |fraction| {
            bar.set_position((fraction * 100.0) as u64);
        }));
    }

    let mut rendered = Vec::new();
    let count = pipeline.process(&note, &samples, &mut rendered)?;
    bar.finish_with_message("done");

    println!(
        "rendered {count} samples ({:.2} s) -> {}",
        count as f64 / f64::from(spec.sample_rate),
        args.output.display()
    );
    if args.profile {
        print!("{}", pipeline.monitor().summary());
        println!(
            "performance score: {:.3}",
            pipeline.monitor().performance_score(spec.sample_rate)
        );
    }
    Ok(())
}
