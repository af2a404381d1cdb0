//! Parameter stream analysis of a vocal WAV.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Args;
use voz_analysis::{
    AperiodicityAnalyzer, F0Algorithm, F0Estimator, SpectrumAnalyzer, hz_to_mel,
};

/// Arguments for `voz analyze`.
#[derive(Args)]
pub struct AnalyzeArgs {
    /// Input vocal WAV
    pub input: PathBuf,

    /// F0 algorithm: 0 = periodicity search, 1 = autocorrelation
    #[arg(long, default_value_t = 0)]
    pub algorithm: u32,

    /// Pipeline config TOML
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub fn run(args: AnalyzeArgs) -> anyhow::Result<()> {
    let (samples, spec) =
        voz_io::read_wav(&args.input).with_context(|| format!("loading {}", args.input.display()))?;
    if samples.is_empty() {
        bail!("{} contains no samples", args.input.display());
    }
    let config = super::load_config(args.config.as_ref())?;
    let sr = spec.sample_rate;
    let period = config.f0.frame_period_ms;

    let estimator = F0Estimator::new(voz_analysis::F0Config {
        sample_rate: sr,
        frame_period_ms: period,
        f0_floor: config.f0.f0_floor,
        f0_ceil: config.f0.f0_ceil,
        algorithm: F0Algorithm::from_index(args.algorithm)?,
    })?;
    let (f0, time_axis) = estimator.estimate(&samples);

    let spectrum = SpectrumAnalyzer::new(voz_analysis::SpectrumConfig {
        sample_rate: sr,
        frame_period_ms: period,
        fft_size: config.spectrum.fft_size,
        q1: config.spectrum.q1,
    })?
    .analyze(&samples, &f0);

    let aperiodicity = AperiodicityAnalyzer::new(voz_analysis::AperiodicityConfig {
        sample_rate: sr,
        frame_period_ms: period,
        fft_size: config.spectrum.fft_size,
        threshold: config.aperiodicity.threshold,
    })?
    .analyze(&samples, &f0);

    let frames = f0.len();
    let voiced: Vec<f64> = f0.iter().copied().filter(|&x| x > 0.0).collect();
    println!(
        "{}: {:.3} s, {} Hz, {} frames ({} ms period)",
        args.input.display(),
        samples.len() as f64 / f64::from(sr),
        sr,
        frames,
        period
    );
    println!(
        "voiced: {}/{} frames ({:.1}%)",
        voiced.len(),
        frames,
        100.0 * voiced.len() as f64 / frames.max(1) as f64
    );
    if !voiced.is_empty() {
        let mut sorted = voiced.clone();
        sorted.sort_by(f64::total_cmp);
        let median = sorted[sorted.len() / 2];
        println!(
            "f0: median {median:.1} Hz ({:.0} mel), range {:.1}..{:.1} Hz",
            hz_to_mel(median),
            sorted[0],
            sorted[sorted.len() - 1]
        );
    }

    // Band summaries over a mid-stream frame.
    let mid = frames / 2;
    let env = spectrum.row(mid);
    let ap = aperiodicity.row(mid);
    let energy: f64 = env.iter().sum();
    let mean_ap: f64 = ap.iter().sum::<f64>() / ap.len() as f64;
    println!(
        "mid frame {}: t = {:.3} s, envelope energy {:.3e}, mean aperiodicity {:.3}",
        mid, time_axis[mid], energy, mean_ap
    );
    Ok(())
}
