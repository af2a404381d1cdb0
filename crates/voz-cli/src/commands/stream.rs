//! Streaming (chunked) rendering with cooperative Ctrl-C cancellation.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::{Context, bail};
use clap::Args;
use voz_config::NoteParams;
use voz_pipeline::Pipeline;

/// Arguments for `voz stream`.
#[derive(Args)]
pub struct StreamArgs {
    /// Input vocal WAV
    pub input: PathBuf,

    /// Output WAV assembled from the streamed chunks
    pub output: PathBuf,

    /// Target pitch in Hz (0 keeps the source pitch)
    #[arg(long, default_value_t = 0.0)]
    pub pitch: f64,

    /// Chunk size in samples
    #[arg(long, default_value_t = 1024)]
    pub chunk: usize,

    /// Pipeline config TOML
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub fn run(args: StreamArgs) -> anyhow::Result<()> {
    let (samples, spec) =
        voz_io::read_wav(&args.input).with_context(|| format!("loading {}", args.input.display()))?;
    if samples.is_empty() {
        bail!("{} contains no samples", args.input.display());
    }

    let mut config = super::load_config(args.config.as_ref())?;
    config.audio.sample_rate = spec.sample_rate;
    config.audio.buffer_size = args.chunk;
    config.validate()?;

    let note = NoteParams {
        input_wav: Some(args.input.clone()),
        target_pitch: args.pitch,
        sample_rate: spec.sample_rate,
        ..NoteParams::default()
    };

    let mut pipeline = Pipeline::new(config)?;
    pipeline.initialize()?;

    // Ctrl-C flips the cooperative cancel flag; the stream winds down at
    // the next chunk boundary.
    let cancel = pipeline.cancel_handle();
    ctrlc::set_handler(move || {
        eprintln!("cancelling...");
        cancel.cancel();
    })
    .context("installing Ctrl-C handler")?;

    let collected = Arc::new(Mutex::new(Vec::<f32>::new()));
    let chunks_seen = Arc::new(Mutex::new(0usize));
    {
        let collected = Arc::clone(&collected);
        let chunks_seen = Arc::clone(&chunks_seen);
        pipeline.process_streaming(
            &note,
            &samples,
            Box::new(move |chunk| {
                if chunk.is_empty() {
                    eprintln!("stream aborted");
                    return true;
                }
                collected.lock().unwrap().extend_from_slice(chunk);
                *chunks_seen.lock().unwrap() += 1;
                true
            }),
        )?;
    }

    let rendered = Arc::try_unwrap(collected)
        .map_err(|_| anyhow::anyhow!("stream consumer still holds the buffer"))?
        .into_inner()
        .expect("no other lock holder remains");
    let count = *chunks_seen.lock().unwrap();
    println!(
        "streamed {count} chunks, {} samples ({:.2} s)",
        rendered.len(),
        rendered.len() as f64 / f64::from(spec.sample_rate)
    );

    voz_io::write_wav(
        &args.output,
        &rendered,
        voz_io::WavSpec {
            sample_rate: spec.sample_rate,
            bits_per_sample: 16,
        },
    )?;
    println!("wrote {}", args.output.display());
    Ok(())
}
