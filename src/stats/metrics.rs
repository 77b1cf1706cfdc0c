//! Latency, frame-rate and throughput aggregation

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::time::Instant;

use crate::stats::benchmark::{BenchmarkCapture, BenchmarkReport, BenchmarkState};
use crate::stats::config::MetricsConfig;
use crate::stats::counters::ByteSample;
use crate::stats::window::{MovingAverage, SampleWindow};

/// Milliseconds since the Unix epoch, the clock capture timestamps use
pub fn wall_clock_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

/// Epoch milliseconds derived from tokio's monotonic clock
///
/// Anchored to the wall clock once, then advanced by `Instant`, so display
/// timestamps never step backwards and follow a paused test clock.
#[derive(Debug, Clone, Copy)]
pub struct DisplayClock {
    origin_ms: f64,
    origin: Instant,
}

impl DisplayClock {
    pub fn new() -> Self {
        Self::anchored(wall_clock_ms(), Instant::now())
    }

    pub fn anchored(origin_ms: f64, origin: Instant) -> Self {
        Self { origin_ms, origin }
    }

    pub fn now_ms(&self) -> f64 {
        self.at(Instant::now())
    }

    pub fn at(&self, instant: Instant) -> f64 {
        self.origin_ms + instant.saturating_duration_since(self.origin).as_secs_f64() * 1000.0
    }
}

impl Default for DisplayClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics computed by one tick, unsmoothed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub fps_processed: f64,
    /// None until a baseline tick exists
    pub uplink_kbps: Option<f64>,
    pub downlink_kbps: Option<f64>,
    pub latency_median_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
    pub total_frames: u64,
}

/// Values for a live display, smoothed over the last few ticks
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiveStats {
    pub fps: f64,
    pub uplink_kbps: Option<f64>,
    pub downlink_kbps: Option<f64>,
    pub latency_median_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
    pub benchmark_running: bool,
}

/// Aggregates timing events and byte counters into windowed statistics
///
/// Owned by the render loop; not shared.
#[derive(Debug)]
pub struct MetricsAggregator {
    config: MetricsConfig,
    latency: SampleWindow,
    frames_since_tick: u64,
    total_frames: u64,
    last_tick: Option<(Instant, ByteSample)>,
    fps_avg: MovingAverage,
    uplink_avg: MovingAverage,
    downlink_avg: MovingAverage,
    live: LiveStats,
    benchmark: Option<BenchmarkState>,
    finished: Option<BenchmarkReport>,
}

impl MetricsAggregator {
    pub fn new(config: MetricsConfig) -> Self {
        let span = config.moving_average_span;
        Self {
            latency: SampleWindow::new(config.window_size),
            frames_since_tick: 0,
            total_frames: 0,
            last_tick: None,
            fps_avg: MovingAverage::new(span),
            uplink_avg: MovingAverage::new(span),
            downlink_avg: MovingAverage::new(span),
            live: LiveStats::default(),
            benchmark: None,
            finished: None,
            config,
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Record an overlay display at `now` for a frame captured at `capture_ts`
    ///
    /// Returns the latency sample, clamped to zero to absorb clock skew.
    /// A running benchmark only keeps frames displayed before its deadline.
    pub fn observe_frame(&mut self, now: Instant, capture_ts: f64, display_ts: f64) -> f64 {
        let latency = display_ts - capture_ts;
        let latency = if latency.is_finite() {
            latency.max(0.0)
        } else {
            0.0
        };

        self.latency.push(latency);
        self.frames_since_tick += 1;
        self.total_frames += 1;

        if let Some(BenchmarkState::Capturing(capture)) = self.benchmark.as_mut() {
            capture.record_frame(now, capture_ts, display_ts, latency);
        }

        latency
    }

    /// Sample FPS and throughput; expected once per tick interval
    ///
    /// The first call only records the byte-counter baseline.
    pub fn tick(&mut self, now: Instant, counters: ByteSample) -> MetricsSnapshot {
        let elapsed = self
            .last_tick
            .map(|(at, _)| now.saturating_duration_since(at).as_secs_f64())
            .filter(|secs| *secs > 0.0);

        let fps_secs = elapsed.unwrap_or_else(|| self.config.tick_interval.as_secs_f64());
        let fps_processed = if fps_secs > 0.0 {
            self.frames_since_tick as f64 / fps_secs
        } else {
            self.frames_since_tick as f64
        };

        let (uplink_kbps, downlink_kbps) = match (self.last_tick, elapsed) {
            (Some((_, prev)), Some(secs)) => (
                Some(kbps(prev.sent, counters.sent, secs)),
                Some(kbps(prev.received, counters.received, secs)),
            ),
            _ => (None, None),
        };

        self.last_tick = Some((now, counters));
        self.frames_since_tick = 0;

        let snapshot = MetricsSnapshot {
            fps_processed,
            uplink_kbps,
            downlink_kbps,
            latency_median_ms: self.latency.percentile(50.0),
            latency_p95_ms: self.latency.percentile(95.0),
            total_frames: self.total_frames,
        };

        self.update_live(&snapshot);
        self.advance_benchmark(now, uplink_kbps, downlink_kbps);

        snapshot
    }

    /// Arm a benchmark of `duration`, starting at the next tick
    ///
    /// Clears the live windows so warm-up samples do not leak into it.
    pub fn run_benchmark(&mut self, duration: Duration) {
        self.latency.clear();
        self.frames_since_tick = 0;
        self.fps_avg.reset();
        self.uplink_avg.reset();
        self.downlink_avg.reset();
        self.finished = None;
        self.benchmark = Some(BenchmarkState::Armed { duration });
        self.live.benchmark_running = true;

        tracing::info!(duration_s = duration.as_secs_f64(), "Benchmark armed");
    }

    pub fn benchmark_running(&self) -> bool {
        self.benchmark.is_some()
    }

    /// Take the report of a benchmark that has completed
    pub fn take_report(&mut self) -> Option<BenchmarkReport> {
        self.finished.take()
    }

    pub fn live(&self) -> &LiveStats {
        &self.live
    }

    pub fn latency_window(&self) -> &SampleWindow {
        &self.latency
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    fn update_live(&mut self, snapshot: &MetricsSnapshot) {
        self.live.fps = self.fps_avg.push(snapshot.fps_processed);
        if let Some(up) = snapshot.uplink_kbps {
            self.live.uplink_kbps = Some(self.uplink_avg.push(up));
        }
        if let Some(down) = snapshot.downlink_kbps {
            self.live.downlink_kbps = Some(self.downlink_avg.push(down));
        }
        self.live.latency_median_ms = snapshot.latency_median_ms;
        self.live.latency_p95_ms = snapshot.latency_p95_ms;
    }

    fn advance_benchmark(&mut self, now: Instant, uplink: Option<f64>, downlink: Option<f64>) {
        match self.benchmark.take() {
            Some(BenchmarkState::Armed { duration }) => {
                tracing::info!("Benchmark capture started");
                self.benchmark = Some(BenchmarkState::Capturing(BenchmarkCapture::start(
                    now, duration,
                )));
            }
            Some(BenchmarkState::Capturing(mut capture)) => {
                if let (Some(up), Some(down)) = (uplink, downlink) {
                    capture.record_throughput(now, up, down);
                }

                if capture.is_complete(now) {
                    let report = capture.finish();
                    tracing::info!(
                        frames = report.summary.frames,
                        fps = report.summary.fps_processed,
                        median_ms = report.summary.e2e_latency_ms.median,
                        p95_ms = report.summary.e2e_latency_ms.p95,
                        "Benchmark capture finished"
                    );
                    self.finished = Some(report);
                    self.live.benchmark_running = false;
                } else {
                    self.benchmark = Some(BenchmarkState::Capturing(capture));
                }
            }
            None => {}
        }
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

fn kbps(previous: u64, current: u64, secs: f64) -> f64 {
    current.saturating_sub(previous) as f64 * 8.0 / 1000.0 / secs
}
