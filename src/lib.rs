//! Two-peer signaling relay with a backpressured annotation scheduler
//!
//! A producer and a viewer meet in a session on the relay, negotiate a media
//! transport through it, and the viewer overlays annotations computed for
//! its frames while measuring end-to-end latency and throughput.
//!
//! - [`registry`] and [`signaling`]: per-session slots and message routing
//! - [`server`] and [`client`]: the WebSocket front-end and a participant
//! - [`scheduler`]: single-slot backpressure between rendering and annotation
//! - [`stats`]: latency percentiles, frame rate, throughput and benchmarks

pub mod client;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod signaling;
pub mod stats;

pub use client::{ClientConfig, RetryPolicy, SignalingClient};
pub use error::{Error, Result};
pub use protocol::{ClientMessage, ErrorCode, Role, ServerMessage, SessionId};
pub use registry::{RegistryConfig, SessionRegistry};
pub use scheduler::{AnnotationEngine, Frame, OverlaySink, SchedulerConfig, SchedulerLoop};
pub use server::{RelayServer, ServerConfig};
pub use signaling::SignalingRelay;
pub use stats::{BenchmarkReport, DisplayClock, MetricsAggregator, MetricsConfig};
