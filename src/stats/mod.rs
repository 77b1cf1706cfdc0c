//! Metrics aggregation
//!
//! Turns overlay display events and transport byte counters into latency
//! percentiles, processed frame rate and throughput. A benchmark run captures
//! a fixed duration of raw samples and persists them as a JSON report.

pub mod benchmark;
pub mod config;
pub mod counters;
pub mod metrics;
pub mod window;

pub use benchmark::{BenchmarkReport, BenchmarkSamples, BenchmarkSummary, LatencySummary};
pub use config::MetricsConfig;
pub use counters::{ByteCounters, ByteSample, TransportCounters};
pub use metrics::{wall_clock_ms, DisplayClock, LiveStats, MetricsAggregator, MetricsSnapshot};
pub use window::{mean, percentile, MovingAverage, SampleWindow};
