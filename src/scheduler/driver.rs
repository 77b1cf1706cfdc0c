//! Render loop driving the scheduler and metrics
//!
//! Everything runs on one task. Engine calls are spawned and report back
//! through a channel, so the scheduler state is only ever touched here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{Error, Result};
use crate::scheduler::config::SchedulerConfig;
use crate::scheduler::engine::{AnnotationEngine, EngineError};
use crate::scheduler::frame::{Frame, RenderedFrame};
use crate::scheduler::state::{Completion, CompletionOutcome, FrameScheduler, SchedulerStats};
use crate::stats::{
    BenchmarkReport, ByteCounters, DisplayClock, LiveStats, MetricsAggregator, MetricsConfig,
};

const COMPLETION_CAPACITY: usize = 4;

/// Rendering surface the loop draws into on every frame
pub trait OverlaySink: Send + 'static {
    fn draw(&mut self, frame: &RenderedFrame<'_>);
}

/// Statistics reported by a running loop
#[derive(Debug, Clone, PartialEq)]
pub struct LoopStats {
    pub scheduler: SchedulerStats,
    pub live: LiveStats,
}

enum Command {
    Benchmark {
        duration: Duration,
        reply: oneshot::Sender<Result<BenchmarkReport>>,
    },
    Stats {
        reply: oneshot::Sender<LoopStats>,
    },
}

/// Control handle for a [`SchedulerLoop`]
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    /// Capture metrics for `duration` starting at the next tick
    ///
    /// Resolves once the report is built and, if configured, persisted.
    pub async fn run_benchmark(&self, duration: Duration) -> Result<BenchmarkReport> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Benchmark { duration, reply })
            .await
            .map_err(|_| Error::ChannelClosed("scheduler loop"))?;
        rx.await
            .map_err(|_| Error::ChannelClosed("scheduler loop"))?
    }

    pub async fn stats(&self) -> Result<LoopStats> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Stats { reply })
            .await
            .map_err(|_| Error::ChannelClosed("scheduler loop"))?;
        rx.await.map_err(|_| Error::ChannelClosed("scheduler loop"))
    }
}

/// Create the channel a transport feeds decoded frames into
pub fn frame_channel(config: &SchedulerConfig) -> (mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
    mpsc::channel(config.frame_queue_capacity)
}

/// The viewer's render loop
pub struct SchedulerLoop<S: OverlaySink> {
    engine: Arc<dyn AnnotationEngine>,
    sink: S,
    counters: Arc<dyn ByteCounters>,
    scheduler: FrameScheduler,
    metrics: MetricsAggregator,
    clock: DisplayClock,
    frames: mpsc::Receiver<Frame>,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::Sender<Completion>,
    completions_rx: mpsc::Receiver<Completion>,
    benchmark_reply: Option<oneshot::Sender<Result<BenchmarkReport>>>,
    /// Capture time of an applied result not yet drawn
    undisplayed: Option<f64>,
}

impl<S: OverlaySink> SchedulerLoop<S> {
    pub fn new(
        engine: Arc<dyn AnnotationEngine>,
        sink: S,
        counters: Arc<dyn ByteCounters>,
        frames: mpsc::Receiver<Frame>,
        config: SchedulerConfig,
        metrics_config: MetricsConfig,
    ) -> (Self, SchedulerHandle) {
        let (command_tx, commands) = mpsc::channel(config.command_capacity.max(1));
        let (completions_tx, completions_rx) = mpsc::channel(COMPLETION_CAPACITY);

        let this = Self {
            engine,
            sink,
            counters,
            scheduler: FrameScheduler::new(config.submit_when_idle),
            metrics: MetricsAggregator::new(metrics_config),
            clock: DisplayClock::new(),
            frames,
            commands,
            completions_tx,
            completions_rx,
            benchmark_reply: None,
            undisplayed: None,
        };

        (this, SchedulerHandle { commands: command_tx })
    }

    /// Stamp display times with `clock`, which must match the capture clock
    pub fn with_clock(mut self, clock: DisplayClock) -> Self {
        self.clock = clock;
        self
    }

    /// Run until the frame channel closes
    pub async fn run(mut self) -> SchedulerStats {
        let period = self
            .metrics
            .config()
            .tick_interval
            .max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Scheduler loop started");

        loop {
            tokio::select! {
                biased;

                Some(completion) = self.completions_rx.recv() => {
                    self.on_completion(completion);
                }
                // Ahead of frames so a saturated frame channel cannot stall ticks
                now = ticker.tick() => {
                    self.on_tick(now);
                }
                Some(command) = self.commands.recv() => {
                    self.on_command(command);
                }
                frame = self.frames.recv() => match frame {
                    Some(frame) => self.on_frame(frame),
                    None => break,
                },
            }
        }

        let stats = self.scheduler.stats();
        tracing::info!(
            frames = stats.frames,
            submitted = stats.submitted,
            applied = stats.applied,
            dropped = stats.dropped,
            failed = stats.failed,
            "Scheduler loop stopped"
        );
        stats
    }

    fn on_frame(&mut self, frame: Frame) {
        if let Some(next) = self.scheduler.on_frame(&frame) {
            self.submit(next);
        }

        let rendered = self.scheduler.render(&frame);
        self.sink.draw(&rendered);

        if let Some(capture_ts) = self.undisplayed.take() {
            let now = Instant::now();
            self.metrics.observe_frame(now, capture_ts, self.clock.at(now));
        }
    }

    fn submit(&self, frame: Frame) {
        let engine = Arc::clone(&self.engine);
        let tx = self.completions_tx.clone();
        let seq = frame.seq;
        let capture_ts_ms = frame.capture_ts_ms;

        tracing::trace!(seq = seq, "Submitting frame");

        tokio::spawn(async move {
            let started = Instant::now();
            // A panicking engine must still free the in-flight slot
            let result = match tokio::spawn(async move { engine.detect(frame).await }).await {
                Ok(result) => result,
                Err(_) => Err(EngineError::Aborted),
            };

            let completion = Completion {
                seq,
                capture_ts_ms,
                result,
                engine_duration: started.elapsed(),
            };
            let _ = tx.send(completion).await;
        });
    }

    fn on_completion(&mut self, completion: Completion) {
        let capture_ts = completion.capture_ts_ms;
        if self.scheduler.on_completion(completion) == CompletionOutcome::Applied {
            self.undisplayed = Some(capture_ts);
        }
    }

    fn on_tick(&mut self, now: Instant) {
        let snapshot = self.metrics.tick(now, self.counters.sample());
        tracing::debug!(
            fps = snapshot.fps_processed,
            median_ms = ?snapshot.latency_median_ms,
            p95_ms = ?snapshot.latency_p95_ms,
            uplink_kbps = ?snapshot.uplink_kbps,
            downlink_kbps = ?snapshot.downlink_kbps,
            "Metrics tick"
        );

        if let Some(report) = self.metrics.take_report() {
            self.finish_benchmark(report);
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Benchmark { duration, reply } => {
                if self.metrics.benchmark_running() {
                    let _ = reply.send(Err(Error::Busy("benchmark already running")));
                    return;
                }
                self.metrics.run_benchmark(duration);
                self.benchmark_reply = Some(reply);
            }
            Command::Stats { reply } => {
                let _ = reply.send(LoopStats {
                    scheduler: self.scheduler.stats(),
                    live: self.metrics.live().clone(),
                });
            }
        }
    }

    fn finish_benchmark(&mut self, report: BenchmarkReport) {
        let reply = self.benchmark_reply.take();
        let path = self.metrics.config().artifact_path.clone();

        // Persisting is file I/O; keep it off the render loop
        tokio::spawn(async move {
            let result = match path {
                Some(path) => report.persist(&path).await.map(|()| report),
                None => Ok(report),
            };

            match reply {
                Some(reply) => {
                    let _ = reply.send(result);
                }
                None => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Failed to persist benchmark");
                    }
                }
            }
        });
    }
}
