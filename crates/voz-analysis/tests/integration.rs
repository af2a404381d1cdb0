//! Cross-analyzer integration: the three streams agree on one frame grid
//! and compose into a valid parameter aggregate.

use std::f64::consts::TAU;

use voz_analysis::{
    AperiodicityAnalyzer, AperiodicityConfig, F0Config, F0Estimator, SpectrumAnalyzer,
    SpectrumConfig,
};
use voz_core::params::VoiceParameters;

fn vowel_like(secs: f64, rate: u32) -> Vec<f32> {
    // A 180 Hz fundamental with a few formant-ish partials.
    let n = (secs * f64::from(rate)) as usize;
    (0..n)
        .map(|i| {
            let t = i as f64 / f64::from(rate);
            let x = 0.4 * (TAU * 180.0 * t).sin()
                + 0.2 * (TAU * 360.0 * t).sin()
                + 0.1 * (TAU * 720.0 * t).sin();
            x as f32
        })
        .collect()
}

#[test]
fn streams_share_one_frame_grid() {
    let rate = 44100;
    let audio = vowel_like(0.3, rate);

    let estimator = F0Estimator::new(F0Config::default()).unwrap();
    let (f0, time_axis) = estimator.estimate(&audio);

    let spectrum = SpectrumAnalyzer::new(SpectrumConfig::default())
        .unwrap()
        .analyze(&audio, &f0);
    let aperiodicity = AperiodicityAnalyzer::new(AperiodicityConfig::default())
        .unwrap()
        .analyze(&audio, &f0);

    assert_eq!(spectrum.rows(), f0.len());
    assert_eq!(aperiodicity.rows(), f0.len());
    assert_eq!(spectrum.cols(), 1025);
    assert_eq!(aperiodicity.cols(), 1025);

    let params = VoiceParameters {
        f0,
        time_axis,
        spectrum,
        aperiodicity,
        fft_size: 2048,
        sample_rate: rate,
        frame_period_ms: 5.0,
    };
    params.validate().unwrap();
}

#[test]
fn voiced_vowel_reads_as_periodic() {
    let rate = 44100;
    let audio = vowel_like(0.3, rate);

    let estimator = F0Estimator::new(F0Config::default()).unwrap();
    let (f0, _) = estimator.estimate(&audio);
    let voiced = f0.iter().filter(|&&x| x > 0.0).count();
    assert!(voiced * 2 > f0.len(), "only {voiced}/{} frames voiced", f0.len());

    let aperiodicity = AperiodicityAnalyzer::new(AperiodicityConfig::default())
        .unwrap()
        .analyze(&audio, &f0);
    // Mid-stream voiced frames sit well below the noise profile.
    let mid = aperiodicity.row(f0.len() / 2);
    assert!(mid[0] < 0.5);
}
