//! Metrics configuration

use std::path::PathBuf;
use std::time::Duration;

/// Metrics aggregator configuration
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Latency samples kept for live percentiles
    pub window_size: usize,

    /// How often throughput and FPS are sampled
    pub tick_interval: Duration,

    /// Number of ticks averaged for the live display
    pub moving_average_span: usize,

    /// Where benchmark reports are written (None = keep in memory only)
    pub artifact_path: Option<PathBuf>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_size: 300,
            tick_interval: Duration::from_secs(1),
            moving_average_span: 3,
            artifact_path: Some(PathBuf::from("metrics.json")),
        }
    }
}

impl MetricsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the latency window size
    pub fn window_size(mut self, size: usize) -> Self {
        self.window_size = size.max(1);
        self
    }

    /// Set the tick interval
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the live moving-average span
    pub fn moving_average_span(mut self, span: usize) -> Self {
        self.moving_average_span = span.max(1);
        self
    }

    /// Set or clear the benchmark artifact path
    pub fn artifact_path(mut self, path: Option<PathBuf>) -> Self {
        self.artifact_path = path;
        self
    }
}
