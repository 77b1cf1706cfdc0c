//! Fixed-duration benchmark capture and its JSON artifact

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::Result;
use crate::stats::window::{mean, percentile};

/// Upper bound on a capture window
const MAX_CAPTURE: Duration = Duration::from_secs(24 * 60 * 60);

/// Persisted result of one benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub summary: BenchmarkSummary,
    pub samples: BenchmarkSamples,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    pub e2e_latency_ms: LatencySummary,
    pub fps_processed: f64,
    pub uplink_kbps: f64,
    pub downlink_kbps: f64,
    pub duration_s: f64,
    pub frames: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub median: f64,
    pub p95: f64,
}

/// Raw per-frame and per-tick samples, in capture order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSamples {
    pub e2e_latency_ms: Vec<f64>,
    pub capture_ts: Vec<f64>,
    pub display_ts: Vec<f64>,
    pub uplink_kbps: Vec<f64>,
    pub downlink_kbps: Vec<f64>,
}

impl BenchmarkReport {
    /// Write the report as pretty-printed JSON
    pub async fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, json).await?;

        tracing::info!(
            path = %path.display(),
            frames = self.summary.frames,
            fps = self.summary.fps_processed,
            "Benchmark artifact written"
        );
        Ok(())
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Benchmark lifecycle inside the aggregator
#[derive(Debug)]
pub(crate) enum BenchmarkState {
    /// Requested, waiting for the next tick to start the clock
    Armed { duration: Duration },
    Capturing(BenchmarkCapture),
}

/// Samples gathered between the start tick and `started + duration`
#[derive(Debug)]
pub(crate) struct BenchmarkCapture {
    started: Instant,
    deadline: Instant,
    duration: Duration,
    last_tick: Instant,
    samples: BenchmarkSamples,
}

impl BenchmarkCapture {
    pub(crate) fn start(started: Instant, duration: Duration) -> Self {
        let deadline = started
            .checked_add(duration)
            .unwrap_or_else(|| started + MAX_CAPTURE);
        Self {
            started,
            deadline,
            duration: deadline.saturating_duration_since(started),
            last_tick: started,
            samples: BenchmarkSamples::default(),
        }
    }

    /// Record a displayed frame; frames at or past the deadline are refused
    pub(crate) fn record_frame(
        &mut self,
        now: Instant,
        capture_ts: f64,
        display_ts: f64,
        latency: f64,
    ) -> bool {
        if now < self.started || now >= self.deadline {
            return false;
        }
        self.samples.capture_ts.push(capture_ts);
        self.samples.display_ts.push(display_ts);
        self.samples.e2e_latency_ms.push(latency);
        true
    }

    /// Record the rates measured by the tick at `now`
    ///
    /// Kept only when the measured interval began inside the window.
    pub(crate) fn record_throughput(
        &mut self,
        now: Instant,
        uplink_kbps: f64,
        downlink_kbps: f64,
    ) {
        if self.last_tick < self.deadline {
            self.samples.uplink_kbps.push(uplink_kbps);
            self.samples.downlink_kbps.push(downlink_kbps);
        }
        self.last_tick = now;
    }

    pub(crate) fn is_complete(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Exact statistics of the captured samples; nothing is smoothed
    pub(crate) fn finish(self) -> BenchmarkReport {
        let samples = self.samples;
        let duration_s = self.duration.as_secs_f64();
        let frames = samples.e2e_latency_ms.len() as u64;

        let fps_processed = if duration_s > 0.0 {
            frames as f64 / duration_s
        } else {
            0.0
        };

        let summary = BenchmarkSummary {
            e2e_latency_ms: LatencySummary {
                median: percentile(&samples.e2e_latency_ms, 50.0).unwrap_or(0.0),
                p95: percentile(&samples.e2e_latency_ms, 95.0).unwrap_or(0.0),
            },
            fps_processed,
            uplink_kbps: mean(&samples.uplink_kbps).unwrap_or(0.0),
            downlink_kbps: mean(&samples.downlink_kbps).unwrap_or(0.0),
            duration_s,
            frames,
        };

        BenchmarkReport { summary, samples }
    }
}
