//! The pipeline: canonical diagram construction and the three execution
//! modes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use voz_config::{NoteParams, PipelineConfig};
use voz_core::arena::Arena;
use voz_core::error::{EngineError, ErrorKind, Result};
use voz_core::params::VoiceParameters;
use voz_graph::{BlockKind, CancelFlag, Diagram, ExecOptions};
use voz_synth::Synthesizer;

use crate::blocks::{
    AperiodicityBlock, AudioInputBlock, AudioOutputBlock, AudioSink, AudioSource,
    F0ExtractionBlock, ParameterMergeBlock, SpectrumAnalysisBlock, SynthesisBlock,
};
use crate::monitor::{Monitor, MonitorConfig, Stage};

/// Externally observable pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed, no arena yet.
    Uninitialized,
    /// Arena and monitor live.
    Initialized,
    /// Between executions.
    Ready,
    /// An execution is in flight.
    Running,
    /// The last execution finished successfully.
    Completed,
    /// Streaming is paused on back-pressure or request.
    Paused,
    /// The last execution failed; see `last_error`.
    Error,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Uninitialized => "Uninitialized",
            PipelineState::Initialized => "Initialized",
            PipelineState::Ready => "Ready",
            PipelineState::Running => "Running",
            PipelineState::Completed => "Completed",
            PipelineState::Paused => "Paused",
            PipelineState::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Progress callback: fraction complete in [0, 1].
pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;
/// Async completion callback: result kind plus a human-readable message.
pub type CompletionCallback = Box<dyn FnOnce(ErrorKind, String) + Send>;
/// Streaming chunk callback; returning `false` pauses input consumption.
pub type ChunkCallback = Box<dyn FnMut(&[f32]) -> bool + Send>;

struct Shared {
    state: PipelineState,
    last_error: Option<EngineError>,
    last_execution_secs: f64,
    /// Timestamped transition history; bounded to the recent past.
    transitions: Vec<(PipelineState, SystemTime)>,
}

impl Shared {
    fn set_state(&mut self, state: PipelineState) {
        self.state = state;
        self.transitions.push((state, SystemTime::now()));
        if self.transitions.len() > 64 {
            self.transitions.remove(0);
        }
        tracing::debug!(%state, "pipeline state transition");
    }
}

/// Executable owner of the canonical diagram with state, memory, monitor,
/// and callbacks.
pub struct Pipeline {
    config: PipelineConfig,
    arena: Option<Arena>,
    monitor: Arc<Monitor>,
    cancel: CancelFlag,
    shared: Arc<Mutex<Shared>>,
    progress: Option<ProgressCallback>,
    paused: Arc<AtomicBool>,
    streaming: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    created_at: SystemTime,
}

impl Pipeline {
    /// Creates a pipeline from a validated configuration.
    ///
    /// Fails with `InvalidArgument` if the config does not validate; the
    /// arena is not created until [`initialize`](Self::initialize).
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| EngineError::new(ErrorKind::InvalidArgument, e.to_string()))?;
        let monitor = Arc::new(Monitor::new(monitor_config(&config)));
        if config.debug.enable_verbose_logging {
            tracing::info!(
                sample_rate = config.audio.sample_rate,
                fft_size = config.spectrum.fft_size,
                pool_bytes = config.memory.memory_pool_size,
                "pipeline created"
            );
        }
        Ok(Self {
            config,
            arena: None,
            monitor,
            cancel: CancelFlag::default(),
            shared: Arc::new(Mutex::new(Shared {
                state: PipelineState::Uninitialized,
                last_error: None,
                last_execution_secs: 0.0,
                transitions: vec![(PipelineState::Uninitialized, SystemTime::now())],
            })),
            progress: None,
            paused: Arc::new(AtomicBool::new(false)),
            streaming: Arc::new(AtomicBool::new(false)),
            worker: None,
            created_at: SystemTime::now(),
        })
    }

    /// Allocates the arena and brings the pipeline to `Ready`.
    ///
    /// Arena creation failure is fatal for this pipeline and surfaces as
    /// `OutOfMemory`.
    pub fn initialize(&mut self) -> Result<()> {
        {
            let shared = self.lock_shared();
            if shared.state != PipelineState::Uninitialized {
                return Err(EngineError::new(
                    ErrorKind::InvalidState,
                    format!("initialize from {}", shared.state),
                ));
            }
        }
        self.monitor.stage_begin(Stage::Initialization);
        let mut arena = Arena::with_capacity(self.config.memory.memory_pool_size)?;
        arena.set_reuse_enabled(self.config.optimization.enable_memory_reuse);
        self.arena = Some(arena);
        self.monitor.stage_end(Stage::Initialization);

        let mut shared = self.lock_shared();
        shared.set_state(PipelineState::Initialized);
        shared.set_state(PipelineState::Ready);
        Ok(())
    }

    /// Installs a progress callback invoked at stage boundaries.
    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress = Some(callback);
    }

    /// The configuration in force.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The performance monitor.
    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Current state.
    pub fn state(&self) -> PipelineState {
        self.lock_shared().state
    }

    /// The error that sent the pipeline to `Error`, if any.
    pub fn last_error(&self) -> Option<EngineError> {
        self.lock_shared().last_error.clone()
    }

    /// Wall-clock duration of the last completed execution, seconds.
    pub fn last_execution_time(&self) -> f64 {
        self.lock_shared().last_execution_secs
    }

    /// One-shot execution: analyze `input`, apply the note's pitch plan,
    /// resynthesize, and fill `out`.
    ///
    /// Returns the sample count on success. On failure `out` is cleared
    /// (zero-length output) and the pipeline transitions to `Error`.
    pub fn process(
        &mut self,
        note: &NoteParams,
        input: &[f32],
        out: &mut Vec<f32>,
    ) -> Result<usize> {
        self.require_ready("process")?;
        self.cancel.reset();
        self.lock_shared().set_state(PipelineState::Running);

        let started = Instant::now();
        let result = self.run_local_pass(note, input);

        match result {
            Ok(rendered) => {
                let wav_result = write_note_wav(&self.config, note, &rendered);
                let mut shared = self.lock_shared();
                shared.last_execution_secs = started.elapsed().as_secs_f64();
                if let Err(e) = wav_result {
                    shared.last_error = Some(e.clone());
                    shared.set_state(PipelineState::Error);
                    out.clear();
                    return Err(e);
                }
                shared.set_state(PipelineState::Completed);
                drop(shared);
                self.write_debug_artifacts();
                out.clear();
                out.extend_from_slice(&rendered);
                Ok(rendered.len())
            }
            Err(e) => {
                let mut shared = self.lock_shared();
                shared.last_execution_secs = started.elapsed().as_secs_f64();
                shared.last_error = Some(e.clone());
                shared.set_state(PipelineState::Error);
                out.clear();
                Err(e)
            }
        }
    }

    fn run_local_pass(&mut self, note: &NoteParams, input: &[f32]) -> Result<Vec<f32>> {
        let arena = self.arena.as_mut().ok_or_else(|| {
            EngineError::new(ErrorKind::InvalidState, "pipeline has no arena")
        })?;
        run_pass(
            &self.config,
            note,
            input,
            arena,
            &self.monitor,
            &self.cancel,
            self.progress.clone(),
        )
    }

    /// Async execution on a worker thread.
    ///
    /// `on_complete` fires exactly once with the result kind and a
    /// message. Cancelling the pipeline cancels the pending work, which
    /// then completes with `Cancelled`.
    pub fn process_async(
        &mut self,
        note: NoteParams,
        input: Vec<f32>,
        on_complete: CompletionCallback,
    ) -> Result<()> {
        self.require_ready("process_async")?;
        self.cancel.reset();
        self.lock_shared().set_state(PipelineState::Running);

        let config = self.config.clone();
        let monitor = Arc::clone(&self.monitor);
        let cancel = self.cancel.clone();
        let shared = Arc::clone(&self.shared);
        let progress = self.progress.clone();
        let done = Arc::new(AtomicBool::new(false));
        spawn_watchdog(&config, &cancel, &done);

        self.worker = Some(std::thread::spawn(move || {
            let started = Instant::now();
            let result = Arena::with_capacity(config.memory.memory_pool_size).and_then(
                |mut arena| {
                    run_pass(&config, &note, &input, &mut arena, &monitor, &cancel, progress)
                },
            );
            let result = result
                .and_then(|rendered| write_note_wav(&config, &note, &rendered).map(|()| rendered));
            done.store(true, Ordering::Release);

            let mut guard = shared.lock().unwrap_or_else(|p| p.into_inner());
            guard.last_execution_secs = started.elapsed().as_secs_f64();
            match result {
                Ok(rendered) => {
                    guard.set_state(PipelineState::Completed);
                    drop(guard);
                    on_complete(
                        ErrorKind::Success,
                        format!("rendered {} samples", rendered.len()),
                    );
                }
                Err(e) => {
                    guard.last_error = Some(e.clone());
                    guard.set_state(PipelineState::Error);
                    drop(guard);
                    on_complete(e.kind(), e.to_string());
                }
            }
        }));
        Ok(())
    }

    /// Streaming execution: chunked one-shot over the same diagram.
    ///
    /// Each `buffer_size`-sample input chunk runs through the full graph;
    /// the synthesizer's phase and grain state carries across chunks, so
    /// the emitted chunks concatenate sample-continuously. Output is
    /// delivered in exact `buffer_size` chunks through `on_chunk`; a
    /// `false` return pauses input consumption until
    /// [`resume`](Self::resume). On failure the callback receives a final
    /// zero-length sentinel chunk.
    pub fn process_streaming(
        &mut self,
        note: &NoteParams,
        input: &[f32],
        on_chunk: ChunkCallback,
    ) -> Result<()> {
        self.require_ready("process_streaming")?;
        note.validate()
            .map_err(|e| EngineError::new(ErrorKind::InvalidArgument, e.to_string()))?;
        if input.is_empty() {
            return Err(EngineError::new(
                ErrorKind::InvalidArgument,
                "streaming input is empty",
            ));
        }
        self.cancel.reset();
        self.paused.store(false, Ordering::Release);
        self.lock_shared().set_state(PipelineState::Running);
        self.streaming.store(true, Ordering::Release);

        let started = Instant::now();
        let result = self.run_streaming(note, input, on_chunk);

        self.streaming.store(false, Ordering::Release);
        let mut shared = self.lock_shared();
        shared.last_execution_secs = started.elapsed().as_secs_f64();
        match result {
            Ok(()) => {
                shared.set_state(PipelineState::Completed);
                Ok(())
            }
            Err(e) => {
                shared.last_error = Some(e.clone());
                shared.set_state(PipelineState::Error);
                Err(e)
            }
        }
    }

    fn run_streaming(
        &mut self,
        note: &NoteParams,
        input: &[f32],
        on_chunk: ChunkCallback,
    ) -> Result<()> {
        let chunk = self.config.audio.buffer_size;
        let config = self.config.clone();
        let monitor = Arc::clone(&self.monitor);
        let cancel = self.cancel.clone();
        let arena = self.arena.as_mut().ok_or_else(|| {
            EngineError::new(ErrorKind::InvalidState, "pipeline has no arena")
        })?;

        arena.reset();
        monitor.stage_begin(Stage::Initialization);
        let (mut diagram, source, sink) = build_canonical(&config, note, chunk)?;
        if !diagram.supports_streaming() {
            return Err(EngineError::new(
                ErrorKind::NotSupported,
                "a block in the diagram cannot stream",
            ));
        }
        diagram.set_cancel_flag(cancel.clone());
        install_observer(&mut diagram, &monitor, None);
        diagram.initialize(arena)?;
        monitor.stage_end(Stage::Initialization);

        let (mut producer, mut consumer) = rtrb::RingBuffer::<f32>::new(chunk * 16);
        let done = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));
        spawn_watchdog(&config, &cancel, &done);

        let consumer_handle = {
            let done = Arc::clone(&done);
            let failed = Arc::clone(&failed);
            let cancel = cancel.clone();
            let paused = Arc::clone(&self.paused);
            let shared = Arc::clone(&self.shared);
            let mut on_chunk = on_chunk;
            std::thread::spawn(move || {
                let mut staging: Vec<f32> = Vec::with_capacity(chunk * 2);
                loop {
                    let mut received = false;
                    while let Ok(sample) = consumer.pop() {
                        staging.push(sample);
                        received = true;
                        if staging.len() >= chunk * 4 {
                            break;
                        }
                    }
                    while staging.len() >= chunk && !cancel.is_cancelled() {
                        let emitted: Vec<f32> = staging.drain(..chunk).collect();
                        if !on_chunk(&emitted) {
                            paused.store(true, Ordering::Release);
                            shared
                                .lock()
                                .unwrap_or_else(|p| p.into_inner())
                                .set_state(PipelineState::Paused);
                            while paused.load(Ordering::Acquire) && !cancel.is_cancelled() {
                                std::thread::sleep(Duration::from_millis(1));
                            }
                            shared
                                .lock()
                                .unwrap_or_else(|p| p.into_inner())
                                .set_state(PipelineState::Running);
                        }
                    }
                    if cancel.is_cancelled() {
                        break;
                    }
                    if done.load(Ordering::Acquire) && consumer.is_empty() {
                        break;
                    }
                    if !received {
                        std::thread::sleep(Duration::from_micros(500));
                    }
                }
                if failed.load(Ordering::Acquire) {
                    // Error sentinel: a final zero-length chunk.
                    let _ = on_chunk(&[]);
                } else if !staging.is_empty() && !cancel.is_cancelled() {
                    let _ = on_chunk(&staging);
                }
            })
        };

        let opts = exec_options(&config);
        let mut failure: Option<EngineError> = None;
        'chunks: for piece in input.chunks(chunk) {
            if cancel.is_cancelled() {
                failure = Some(EngineError::new(
                    ErrorKind::Cancelled,
                    "streaming cancelled between chunks",
                ));
                break;
            }
            // Back-pressure: a paused consumer halts input consumption.
            while self.paused.load(Ordering::Acquire) && !cancel.is_cancelled() {
                std::thread::sleep(Duration::from_millis(1));
            }

            let mut buf = piece.to_vec();
            buf.resize(chunk, 0.0);
            source.set_samples(buf);
            if let Err(e) = diagram.process_with(chunk, &opts) {
                failure = Some(e);
                break;
            }
            for sample in sink.drain() {
                let mut pending = sample;
                loop {
                    match producer.push(pending) {
                        Ok(()) => break,
                        Err(rtrb::PushError::Full(value)) => {
                            pending = value;
                            if cancel.is_cancelled() {
                                failure = Some(EngineError::new(
                                    ErrorKind::Cancelled,
                                    "streaming cancelled during back-pressure wait",
                                ));
                                break 'chunks;
                            }
                            std::thread::sleep(Duration::from_micros(200));
                        }
                    }
                }
            }
        }

        if failure.is_some() {
            failed.store(true, Ordering::Release);
        }
        done.store(true, Ordering::Release);
        consumer_handle
            .join()
            .map_err(|_| EngineError::new(ErrorKind::Internal, "stream consumer panicked"))?;

        monitor.stage_begin(Stage::Cleanup);
        diagram.cleanup();
        monitor.stage_end(Stage::Cleanup);
        monitor.record_throughput(
            Stage::Total,
            input.len() as u64,
            started_secs(&self.shared),
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// A clone of the cooperative cancel flag, e.g. for a Ctrl-C handler.
    ///
    /// Cancelling through it has the same effect as [`stop`](Self::stop)
    /// minus the state transition, which the owning thread performs when
    /// the cancelled pass returns.
    pub fn cancel_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Requests a pause; streaming halts at the next chunk boundary.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        let mut shared = self.lock_shared();
        if shared.state == PipelineState::Running {
            shared.set_state(PipelineState::Paused);
        }
    }

    /// Resumes a paused stream.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        let mut shared = self.lock_shared();
        if shared.state == PipelineState::Paused {
            shared.set_state(PipelineState::Running);
        }
    }

    /// Cooperative stop: the in-flight block completes, no further block
    /// runs, and the pipeline returns to `Ready`.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.paused.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.cancel.reset();
        self.lock_shared().set_state(PipelineState::Ready);
    }

    /// Clears the recorded error and re-arms the pipeline.
    pub fn clear_error(&mut self) {
        let mut shared = self.lock_shared();
        if shared.state == PipelineState::Error {
            shared.last_error = None;
            shared.set_state(PipelineState::Ready);
        }
    }

    /// Stops any execution, installs the new configuration, and
    /// re-initializes the arena. The pipeline returns to `Ready`.
    pub fn reconfigure(&mut self, new_config: PipelineConfig) -> Result<()> {
        new_config
            .validate()
            .map_err(|e| EngineError::new(ErrorKind::InvalidArgument, e.to_string()))?;
        self.stop();
        self.arena = None;
        self.config = new_config;
        let mut arena = Arena::with_capacity(self.config.memory.memory_pool_size)?;
        arena.set_reuse_enabled(self.config.optimization.enable_memory_reuse);
        self.arena = Some(arena);
        self.lock_shared().set_state(PipelineState::Ready);
        tracing::debug!("pipeline reconfigured");
        Ok(())
    }

    /// DOT export of the canonical diagram under the current config.
    pub fn to_dot(&self) -> Result<String> {
        let (diagram, _, _) = build_canonical(
            &self.config,
            &NoteParams::default(),
            self.config.audio.frame_size,
        )?;
        Ok(diagram.to_dot())
    }

    /// Writes the debug state dump.
    pub fn dump_state(&self, path: &std::path::Path) -> std::io::Result<()> {
        use std::fmt::Write as _;
        let shared = self.lock_shared();
        let mut text = String::new();
        let _ = writeln!(text, "pipeline state: {}", shared.state);
        let _ = writeln!(text, "initialized: {}", self.arena.is_some());
        let _ = writeln!(
            text,
            "running: {}",
            shared.state == PipelineState::Running
        );
        let _ = writeln!(text, "streaming: {}", self.streaming.load(Ordering::Acquire));
        let _ = writeln!(
            text,
            "last error: {}",
            shared
                .last_error
                .as_ref()
                .map_or_else(|| "none".into(), |e| format!("{:?}", e.kind()))
        );
        let _ = writeln!(
            text,
            "error message: {}",
            shared
                .last_error
                .as_ref()
                .map_or("", |e| e.message())
        );
        let _ = writeln!(text, "created: {:?}", self.created_at);
        let _ = writeln!(
            text,
            "last execution time: {:.6} s",
            shared.last_execution_secs
        );
        let _ = writeln!(text, "\n[configuration]\n{}", self.config.to_toml());
        drop(shared);
        std::fs::write(path, text)
    }

    /// Best-effort state dump and DOT export after a completed pass.
    fn write_debug_artifacts(&self) {
        if !self.config.debug.enable_debug_output {
            return;
        }
        let dir = if self.config.debug.debug_output_dir.is_empty() {
            std::path::PathBuf::from(".")
        } else {
            std::path::PathBuf::from(&self.config.debug.debug_output_dir)
        };
        if let Err(e) = self.dump_state(&dir.join("pipeline_state.txt")) {
            tracing::warn!(error = %e, "state dump failed");
        }
        match self.to_dot() {
            Ok(dot) => {
                if let Err(e) = std::fs::write(dir.join("pipeline.dot"), dot) {
                    tracing::warn!(error = %e, "DOT export failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "DOT export failed"),
        }
    }

    fn require_ready(&self, op: &str) -> Result<()> {
        let state = self.state();
        match state {
            PipelineState::Ready | PipelineState::Completed | PipelineState::Initialized => Ok(()),
            other => Err(EngineError::new(
                ErrorKind::InvalidState,
                format!("{op} requires a ready pipeline, state is {other}"),
            )),
        }
    }

    fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn started_secs(shared: &Arc<Mutex<Shared>>) -> f64 {
    // Streaming throughput uses the duration since entering Running.
    let guard = shared.lock().unwrap_or_else(|p| p.into_inner());
    guard
        .transitions
        .iter()
        .rev()
        .find(|(s, _)| *s == PipelineState::Running)
        .and_then(|(_, at)| at.elapsed().ok())
        .map_or(0.0, |d| d.as_secs_f64())
}

fn monitor_config(config: &PipelineConfig) -> MonitorConfig {
    let csv_path = if config.performance.enable_profiling
        && !config.performance.profile_output_dir.is_empty()
    {
        Some(
            std::path::Path::new(&config.performance.profile_output_dir)
                .join("performance_log.csv"),
        )
    } else {
        None
    };
    MonitorConfig {
        csv_path,
        ..MonitorConfig::default()
    }
}

fn exec_options(config: &PipelineConfig) -> ExecOptions {
    ExecOptions {
        parallel: config.optimization.enable_parallel_execution,
        max_threads: config.optimization.max_thread_count,
    }
}

/// Blocks in the canonical diagram; the progress callback's denominator.
const CANONICAL_BLOCK_COUNT: usize = 7;

/// Frame hop in samples.
fn hop_samples(sample_rate: u32, frame_period_ms: f64) -> usize {
    (frame_period_ms / 1000.0 * f64::from(sample_rate)).round() as usize
}

fn stage_for(kind: BlockKind) -> Option<Stage> {
    match kind {
        BlockKind::AudioInput => Some(Stage::AudioInput),
        BlockKind::F0Extraction => Some(Stage::F0Extraction),
        BlockKind::SpectrumAnalysis => Some(Stage::SpectrumAnalysis),
        BlockKind::AperiodicityAnalysis => Some(Stage::AperiodicityAnalysis),
        BlockKind::ParameterMerge => Some(Stage::ParameterMerge),
        BlockKind::Synthesis => Some(Stage::Synthesis),
        BlockKind::AudioOutput => Some(Stage::AudioOutput),
        BlockKind::Custom => None,
    }
}

fn install_observer(
    diagram: &mut Diagram,
    monitor: &Arc<Monitor>,
    progress: Option<ProgressCallback>,
) {
    let monitor = Arc::clone(monitor);
    let counter = AtomicUsize::new(0);
    diagram.set_block_observer(Box::new(move |kind, elapsed| {
        if let Some(stage) = stage_for(kind) {
            monitor.record_duration(stage, elapsed.as_secs_f64());
        }
        if let Some(progress) = &progress {
            let finished = counter.fetch_add(1, Ordering::Relaxed) + 1;
            progress((finished as f32 / CANONICAL_BLOCK_COUNT as f32).min(1.0));
        }
    }));
}

fn spawn_watchdog(config: &PipelineConfig, cancel: &CancelFlag, done: &Arc<AtomicBool>) {
    let timeout = config.performance.timeout_seconds;
    if timeout <= 0.0 {
        return;
    }
    let cancel = cancel.clone();
    let done = Arc::clone(done);
    std::thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs_f64(timeout);
        while Instant::now() < deadline {
            if done.load(Ordering::Acquire) {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        if !done.load(Ordering::Acquire) {
            tracing::warn!(timeout, "pipeline watchdog expired, cancelling");
            cancel.cancel();
        }
    });
}

/// Builds the canonical analysis→synthesis diagram for `n_samples` of
/// input per pass.
fn build_canonical(
    config: &PipelineConfig,
    note: &NoteParams,
    n_samples: usize,
) -> Result<(Diagram, AudioSource, AudioSink)> {
    let sr = config.audio.sample_rate;
    let period = config.f0.frame_period_ms;
    let fft_size = config.spectrum.fft_size;
    let bins = fft_size / 2 + 1;
    let frames = VoiceParameters::frame_count_for(n_samples, sr, period);
    let hop = hop_samples(sr, period);
    let synth_capacity = frames * hop + hop;

    let estimator = voz_analysis::F0Estimator::new(voz_analysis::F0Config {
        sample_rate: sr,
        frame_period_ms: period,
        f0_floor: config.f0.f0_floor,
        f0_ceil: config.f0.f0_ceil,
        algorithm: voz_analysis::F0Algorithm::from_index(config.f0.algorithm)?,
    })?;
    let spectrum_analyzer = voz_analysis::SpectrumAnalyzer::new(voz_analysis::SpectrumConfig {
        sample_rate: sr,
        frame_period_ms: period,
        fft_size,
        q1: config.spectrum.q1,
    })?;
    let ap_analyzer = voz_analysis::AperiodicityAnalyzer::new(voz_analysis::AperiodicityConfig {
        sample_rate: sr,
        frame_period_ms: period,
        fft_size,
        threshold: config.aperiodicity.threshold,
    })?;
    let synthesizer = Synthesizer::new(voz_synth::SynthesisConfig {
        enable_postfilter: config.synthesis.enable_postfilter,
        max_duration_sec: config.synthesis.max_duration_sec,
    });

    let source = AudioSource::new();
    let sink = AudioSink::new();

    let mut diagram = Diagram::new();
    let input = diagram.add_block(AudioInputBlock::build(
        "audio_input",
        n_samples,
        source.clone(),
    )?)?;
    let f0 = diagram.add_block(F0ExtractionBlock::build(
        "f0_extraction",
        n_samples,
        frames,
        estimator,
    )?)?;
    let spectrum = diagram.add_block(SpectrumAnalysisBlock::build(
        "spectrum_analysis",
        n_samples,
        frames,
        spectrum_analyzer,
    )?)?;
    let aperiodicity = diagram.add_block(AperiodicityBlock::build(
        "aperiodicity_analysis",
        n_samples,
        frames,
        ap_analyzer,
    )?)?;
    let merge = diagram.add_block(ParameterMergeBlock::build(
        "parameter_merge",
        frames,
        bins,
        note,
        sr,
        period,
        fft_size,
    )?)?;
    let synthesis = diagram.add_block(SynthesisBlock::build(
        "synthesis",
        synth_capacity,
        synthesizer,
    )?)?;
    let output = diagram.add_block(AudioOutputBlock::build(
        "audio_output",
        synth_capacity,
        frames * hop,
        note.volume as f32,
        config.optimization.enable_simd,
        sink.clone(),
    )?)?;

    diagram.connect(input, 0, f0, 0)?;
    diagram.connect(input, 0, spectrum, 0)?;
    diagram.connect(input, 0, aperiodicity, 0)?;
    diagram.connect(f0, 0, spectrum, 1)?;
    diagram.connect(f0, 0, aperiodicity, 1)?;
    diagram.connect(f0, 0, merge, 0)?;
    diagram.connect(spectrum, 0, merge, 1)?;
    diagram.connect(aperiodicity, 0, merge, 2)?;
    diagram.connect(merge, 0, synthesis, 0)?;
    diagram.connect(synthesis, 0, output, 0)?;
    diagram.build()?;

    Ok((diagram, source, sink))
}

/// One full pass: build, initialize, execute, collect, tear down.
fn run_pass(
    config: &PipelineConfig,
    note: &NoteParams,
    input: &[f32],
    arena: &mut Arena,
    monitor: &Arc<Monitor>,
    cancel: &CancelFlag,
    progress: Option<ProgressCallback>,
) -> Result<Vec<f32>> {
    let started = Instant::now();
    monitor.stage_begin(Stage::Total);

    monitor.stage_begin(Stage::ParameterParsing);
    note.validate()
        .map_err(|e| EngineError::new(ErrorKind::InvalidArgument, e.to_string()))?;
    if input.is_empty() {
        return Err(EngineError::new(
            ErrorKind::InvalidArgument,
            "input audio is empty",
        ));
    }
    monitor.stage_end(Stage::ParameterParsing);

    arena.reset();
    monitor.stage_begin(Stage::Initialization);
    let (mut diagram, source, sink) = build_canonical(config, note, input.len())?;
    diagram.set_cancel_flag(cancel.clone());
    install_observer(&mut diagram, monitor, progress);
    diagram.initialize(arena)?;
    monitor.stage_end(Stage::Initialization);

    source.set_samples(input.to_vec());
    let pass = diagram.process_with(input.len(), &exec_options(config));

    monitor.stage_begin(Stage::Cleanup);
    diagram.cleanup();
    monitor.stage_end(Stage::Cleanup);

    pass?;
    let rendered = sink.drain();

    if config.memory.enable_memory_tracking {
        monitor.record_memory(Stage::Total, arena.peak_used() as u64);
    }
    monitor.record_throughput(
        Stage::Total,
        input.len() as u64,
        started.elapsed().as_secs_f64(),
    );
    monitor.stage_end(Stage::Total);
    tracing::debug!(
        samples_in = input.len(),
        samples_out = rendered.len(),
        "pass complete"
    );
    Ok(rendered)
}

fn write_note_wav(config: &PipelineConfig, note: &NoteParams, rendered: &[f32]) -> Result<()> {
    let Some(path) = &note.output_wav else {
        return Ok(());
    };
    let spec = voz_io::WavSpec {
        sample_rate: config.audio.sample_rate,
        bits_per_sample: note.bit_depth,
    };
    voz_io::write_wav(path, rendered, spec)
        .map_err(|e| EngineError::new(ErrorKind::FileWrite, e.to_string()))
}
