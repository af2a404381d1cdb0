//! Performance monitor: per-stage timing, memory, throughput, quality.
//!
//! The monitor is an instance object handed to the pipeline — never a
//! global. All mutation goes through one internal mutex; every public
//! method is `&self` so the monitor can be shared behind an `Arc` between
//! the pipeline, the executor observer, and worker threads.
//!
//! Each stage keeps a bounded ring of recent execution times from which
//! summary statistics (min/max/mean/stddev/median/p95/p99) are computed
//! on demand. Threshold violations are logged through `tracing::warn!`,
//! never raised. CSV appends are best-effort: a failed write is logged
//! and the pipeline proceeds.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use voz_io::CsvLog;

/// Fixed pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Stage {
    /// Engine and diagram construction.
    Initialization = 0,
    /// Note/config parsing and validation.
    ParameterParsing = 1,
    /// PCM ingestion.
    AudioInput = 2,
    /// Fundamental frequency extraction.
    F0Extraction = 3,
    /// Spectral envelope analysis.
    SpectrumAnalysis = 4,
    /// Band aperiodicity analysis.
    AperiodicityAnalysis = 5,
    /// Parameter stream merge.
    ParameterMerge = 6,
    /// Waveform synthesis.
    Synthesis = 7,
    /// PCM emission.
    AudioOutput = 8,
    /// Teardown.
    Cleanup = 9,
    /// Whole-pass envelope.
    Total = 10,
}

/// Number of stages, for table sizing.
pub const STAGE_COUNT: usize = 11;

/// All stages in declaration order.
pub const ALL_STAGES: [Stage; STAGE_COUNT] = [
    Stage::Initialization,
    Stage::ParameterParsing,
    Stage::AudioInput,
    Stage::F0Extraction,
    Stage::SpectrumAnalysis,
    Stage::AperiodicityAnalysis,
    Stage::ParameterMerge,
    Stage::Synthesis,
    Stage::AudioOutput,
    Stage::Cleanup,
    Stage::Total,
];

impl Stage {
    /// Stable numeric id.
    pub fn id(self) -> u32 {
        self as u32
    }

    /// Display name, also used in CSV rows.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Initialization => "Initialization",
            Stage::ParameterParsing => "ParameterParsing",
            Stage::AudioInput => "AudioInput",
            Stage::F0Extraction => "F0Extraction",
            Stage::SpectrumAnalysis => "SpectrumAnalysis",
            Stage::AperiodicityAnalysis => "AperiodicityAnalysis",
            Stage::ParameterMerge => "ParameterMerge",
            Stage::Synthesis => "Synthesis",
            Stage::AudioOutput => "AudioOutput",
            Stage::Cleanup => "Cleanup",
            Stage::Total => "Total",
        }
    }
}

/// Monitor tuning.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Ring size of retained execution times per stage.
    pub history_size: usize,
    /// Per-stage wall-clock alert threshold, seconds.
    pub performance_threshold: f64,
    /// Per-stage memory alert threshold, bytes.
    pub memory_threshold: u64,
    /// CSV log destination; `None` disables the log.
    pub csv_path: Option<std::path::PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_size: 256,
            performance_threshold: 1.0,
            memory_threshold: 1 << 30,
            csv_path: None,
        }
    }
}

/// Summary statistics over a stage's retained history.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageStats {
    /// Number of retained samples.
    pub count: usize,
    /// Minimum execution time, seconds.
    pub min: f64,
    /// Maximum execution time, seconds.
    pub max: f64,
    /// Mean execution time, seconds.
    pub mean: f64,
    /// Standard deviation, seconds.
    pub stddev: f64,
    /// Median execution time, seconds.
    pub median: f64,
    /// 95th percentile, seconds.
    pub p95: f64,
    /// 99th percentile, seconds.
    pub p99: f64,
}

#[derive(Debug, Default)]
struct StageSlot {
    history: VecDeque<f64>,
    begin: Option<Instant>,
    call_count: u64,
    total_time: f64,
    memory_bytes: u64,
    peak_memory: u64,
    cpu_ratio: f64,
    samples_processed: u64,
    processing_secs: f64,
    quality_sum: f64,
    quality_count: u64,
}

struct Inner {
    slots: [StageSlot; STAGE_COUNT],
    csv: Option<CsvLog>,
}

/// Thread-safe per-stage performance monitor.
pub struct Monitor {
    cfg: MonitorConfig,
    inner: Mutex<Inner>,
    epoch: Instant,
}

impl Monitor {
    /// Creates a monitor with the given tuning.
    pub fn new(cfg: MonitorConfig) -> Self {
        let csv = cfg.csv_path.as_ref().map(CsvLog::new);
        Self {
            cfg,
            inner: Mutex::new(Inner {
                slots: Default::default(),
                csv,
            }),
            epoch: Instant::now(),
        }
    }

    /// Marks the start of a stage on the monotonic clock.
    pub fn stage_begin(&self, stage: Stage) {
        let mut inner = self.lock();
        inner.slots[stage as usize].begin = Some(Instant::now());
    }

    /// Marks the end of a stage, records the duration, appends the CSV
    /// row, and checks the alert thresholds.
    pub fn stage_end(&self, stage: Stage) {
        let now = Instant::now();
        let timestamp = now.duration_since(self.epoch).as_secs_f64();
        let mut inner = self.lock();
        let Some(begin) = inner.slots[stage as usize].begin.take() else {
            tracing::warn!(stage = stage.name(), "stage_end without stage_begin");
            return;
        };
        let secs = now.duration_since(begin).as_secs_f64();
        self.record_time_locked(&mut inner, stage, secs, timestamp);
    }

    /// Records an externally measured duration for a stage.
    pub fn record_duration(&self, stage: Stage, secs: f64) {
        let timestamp = Instant::now().duration_since(self.epoch).as_secs_f64();
        let mut inner = self.lock();
        self.record_time_locked(&mut inner, stage, secs, timestamp);
    }

    fn record_time_locked(&self, inner: &mut Inner, stage: Stage, secs: f64, timestamp: f64) {
        let history_size = self.cfg.history_size.max(1);
        {
            let slot = &mut inner.slots[stage as usize];
            slot.call_count += 1;
            slot.total_time += secs;
            if slot.history.len() == history_size {
                slot.history.pop_front();
            }
            slot.history.push_back(secs);
        }

        if secs > self.cfg.performance_threshold {
            tracing::warn!(
                stage = stage.name(),
                seconds = secs,
                threshold = self.cfg.performance_threshold,
                "stage exceeded its time budget"
            );
        }

        let (memory, cpu) = {
            let slot = &inner.slots[stage as usize];
            (slot.memory_bytes, slot.cpu_ratio)
        };
        if let Some(csv) = inner.csv.as_mut()
            && let Err(e) = csv.append(timestamp, stage.id(), stage.name(), secs, memory, cpu)
        {
            // Best-effort: the monitor never fails the pipeline.
            tracing::warn!(error = %e, "performance CSV append failed");
        }
    }

    /// Records a stage's memory footprint.
    pub fn record_memory(&self, stage: Stage, bytes: u64) {
        let mut inner = self.lock();
        let slot = &mut inner.slots[stage as usize];
        slot.memory_bytes = bytes;
        slot.peak_memory = slot.peak_memory.max(bytes);
        if bytes > self.cfg.memory_threshold {
            tracing::warn!(
                stage = stage.name(),
                bytes,
                threshold = self.cfg.memory_threshold,
                "stage exceeded its memory budget"
            );
        }
    }

    /// Records a stage's CPU utilization ratio in [0, 1].
    pub fn record_cpu(&self, stage: Stage, ratio: f64) {
        self.lock().slots[stage as usize].cpu_ratio = ratio.clamp(0.0, 1.0);
    }

    /// Records processed sample throughput for a stage.
    pub fn record_throughput(&self, stage: Stage, samples: u64, seconds: f64) {
        let mut inner = self.lock();
        let slot = &mut inner.slots[stage as usize];
        slot.samples_processed += samples;
        slot.processing_secs += seconds;
    }

    /// Records a quality score in [0, 1]; the accumulator lives on this
    /// instance, so concurrent pipelines never share state.
    pub fn record_quality(&self, stage: Stage, score: f64) {
        let mut inner = self.lock();
        let slot = &mut inner.slots[stage as usize];
        slot.quality_sum += score.clamp(0.0, 1.0);
        slot.quality_count += 1;
    }

    /// Summary statistics over the stage's retained history.
    pub fn stats(&self, stage: Stage) -> StageStats {
        let inner = self.lock();
        let slot = &inner.slots[stage as usize];
        compute_stats(&slot.history)
    }

    /// Peak recorded memory for a stage.
    pub fn peak_memory(&self, stage: Stage) -> u64 {
        self.lock().slots[stage as usize].peak_memory
    }

    /// Realtime factor: audio seconds produced per processing second.
    ///
    /// Greater than 1 means the stage keeps up with realtime.
    pub fn realtime_factor(&self, stage: Stage, sample_rate: u32) -> f64 {
        let inner = self.lock();
        let slot = &inner.slots[stage as usize];
        if slot.processing_secs <= 0.0 || sample_rate == 0 {
            return 0.0;
        }
        (slot.samples_processed as f64 / f64::from(sample_rate)) / slot.processing_secs
    }

    /// Aggregate score in [0, 1]:
    /// `0.4·min(1, realtime) + 0.3·efficiency + 0.3·quality`.
    ///
    /// Efficiency is the fraction of the total pass spent inside DSP
    /// stages (busy ratio).
    pub fn performance_score(&self, sample_rate: u32) -> f64 {
        let rt = self.realtime_factor(Stage::Total, sample_rate).min(1.0);
        let inner = self.lock();
        let total_time = inner.slots[Stage::Total as usize].total_time;
        let busy: f64 = ALL_STAGES
            .iter()
            .filter(|&&s| !matches!(s, Stage::Total | Stage::Initialization | Stage::Cleanup))
            .map(|&s| inner.slots[s as usize].total_time)
            .sum();
        let efficiency = if total_time > 0.0 {
            (busy / total_time).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let (q_sum, q_count): (f64, u64) = ALL_STAGES
            .iter()
            .map(|&s| {
                let slot = &inner.slots[s as usize];
                (slot.quality_sum, slot.quality_count)
            })
            .fold((0.0, 0), |acc, x| (acc.0 + x.0, acc.1 + x.1));
        let quality = if q_count > 0 {
            q_sum / q_count as f64
        } else {
            // No quality data recorded; treat as neutral.
            0.5
        };
        0.4 * rt + 0.3 * efficiency + 0.3 * quality
    }

    /// Human-readable report of all stages with recorded activity.
    pub fn summary(&self) -> String {
        use std::fmt::Write as _;
        let inner = self.lock();
        let mut out = String::from(
            "stage                 calls    total_s      mean_s       p95_s    mem_bytes\n",
        );
        for stage in ALL_STAGES {
            let slot = &inner.slots[stage as usize];
            if slot.call_count == 0 {
                continue;
            }
            let stats = compute_stats(&slot.history);
            let _ = writeln!(
                out,
                "{:<20} {:>6} {:>10.4} {:>11.6} {:>11.6} {:>12}",
                stage.name(),
                slot.call_count,
                slot.total_time,
                stats.mean,
                stats.p95,
                slot.peak_memory,
            );
        }
        out
    }

    /// Prints the summary through tracing at info level.
    pub fn print_summary(&self) {
        for line in self.summary().lines() {
            tracing::info!(target: "voz::perf", "{line}");
        }
    }

    /// Writes the text report to a file. Best-effort like the CSV log.
    pub fn generate_report(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.summary())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn compute_stats(history: &VecDeque<f64>) -> StageStats {
    if history.is_empty() {
        return StageStats::default();
    }
    let mut sorted: Vec<f64> = history.iter().copied().collect();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let var = sorted.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n as f64;
    let pct = |p: f64| -> f64 {
        let idx = ((n as f64 - 1.0) * p).round() as usize;
        sorted[idx.min(n - 1)]
    };
    StageStats {
        count: n,
        min: sorted[0],
        max: sorted[n - 1],
        mean,
        stddev: var.sqrt(),
        median: pct(0.5),
        p95: pct(0.95),
        p99: pct(0.99),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn begin_end_records_history() {
        let monitor = Monitor::new(MonitorConfig::default());
        monitor.stage_begin(Stage::F0Extraction);
        std::thread::sleep(Duration::from_millis(2));
        monitor.stage_end(Stage::F0Extraction);

        let stats = monitor.stats(Stage::F0Extraction);
        assert_eq!(stats.count, 1);
        assert!(stats.min > 0.0);
        assert_eq!(stats.min, stats.max);
    }

    #[test]
    fn end_without_begin_is_harmless() {
        let monitor = Monitor::new(MonitorConfig::default());
        monitor.stage_end(Stage::Synthesis);
        assert_eq!(monitor.stats(Stage::Synthesis).count, 0);
    }

    #[test]
    fn history_ring_is_bounded() {
        let cfg = MonitorConfig {
            history_size: 8,
            ..MonitorConfig::default()
        };
        let monitor = Monitor::new(cfg);
        for i in 0..100 {
            monitor.record_duration(Stage::Synthesis, f64::from(i) * 0.001);
        }
        let stats = monitor.stats(Stage::Synthesis);
        assert_eq!(stats.count, 8);
        // Only the most recent eight survive.
        assert!((stats.min - 0.092).abs() < 1e-9);
        assert!((stats.max - 0.099).abs() < 1e-9);
    }

    #[test]
    fn stats_percentiles_ordered() {
        let monitor = Monitor::new(MonitorConfig::default());
        for i in 1..=100 {
            monitor.record_duration(Stage::Total, f64::from(i));
        }
        let stats = monitor.stats(Stage::Total);
        assert_eq!(stats.count, 100);
        assert!(stats.min <= stats.median);
        assert!(stats.median <= stats.p95);
        assert!(stats.p95 <= stats.p99);
        assert!(stats.p99 <= stats.max);
        assert!((stats.median - 50.0).abs() <= 1.0);
        assert!((stats.mean - 50.5).abs() < 1e-9);
    }

    #[test]
    fn realtime_factor_from_throughput() {
        let monitor = Monitor::new(MonitorConfig::default());
        // 1 second of 44.1 kHz audio processed in half a second.
        monitor.record_throughput(Stage::Total, 44100, 0.5);
        let rt = monitor.realtime_factor(Stage::Total, 44100);
        assert!((rt - 2.0).abs() < 1e-9);
    }

    #[test]
    fn quality_accumulates_per_instance() {
        let a = Monitor::new(MonitorConfig::default());
        let b = Monitor::new(MonitorConfig::default());
        a.record_quality(Stage::Synthesis, 1.0);
        // The second instance must not see the first's accumulator.
        a.record_throughput(Stage::Total, 44100, 1.0);
        b.record_throughput(Stage::Total, 44100, 1.0);
        let score_a = a.performance_score(44100);
        let score_b = b.performance_score(44100);
        assert!(score_a > score_b);
    }

    #[test]
    fn csv_rows_written_per_stage_end(){
        let dir = tempfile::tempdir().unwrap();
        let cfg = MonitorConfig {
            csv_path: Some(dir.path().join("perf.csv")),
            ..MonitorConfig::default()
        };
        let monitor = Monitor::new(cfg);
        monitor.stage_begin(Stage::AudioInput);
        monitor.stage_end(Stage::AudioInput);
        monitor.stage_begin(Stage::Synthesis);
        monitor.stage_end(Stage::Synthesis);

        let text = std::fs::read_to_string(dir.path().join("perf.csv")).unwrap();
        assert!(text.starts_with(voz_io::CSV_HEADER));
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains(",2,AudioInput,"));
        assert!(text.contains(",7,Synthesis,"));
    }

    #[test]
    fn summary_lists_active_stages() {
        let monitor = Monitor::new(MonitorConfig::default());
        monitor.record_duration(Stage::F0Extraction, 0.01);
        let summary = monitor.summary();
        assert!(summary.contains("F0Extraction"));
        assert!(!summary.contains("AperiodicityAnalysis"));
    }
}
