//! Frame scheduling with single-slot backpressure
//!
//! ```text
//!  transport ──Frame──► SchedulerLoop ──draw──► OverlaySink
//!                          │     ▲
//!                   submit │     │ Completion
//!                          ▼     │
//!                     AnnotationEngine (spawned, ≤1 in flight)
//! ```
//!
//! Every received frame is a render tick. The newest annotation is drawn on
//! whatever frame is visible, and applied overlays feed the metrics
//! aggregator.

pub mod config;
pub mod driver;
pub mod engine;
pub mod frame;
pub mod state;

pub use config::SchedulerConfig;
pub use driver::{frame_channel, LoopStats, OverlaySink, SchedulerHandle, SchedulerLoop};
pub use engine::{AnnotationEngine, EngineError};
pub use frame::{AnnotationResult, Frame, Region, RenderedFrame};
pub use state::{Completion, CompletionOutcome, FrameScheduler, SchedulerStats};
