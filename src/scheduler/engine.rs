//! Annotation engine interface

use async_trait::async_trait;

use crate::scheduler::frame::{Frame, Region};

/// Annotation engine failure
///
/// Never fatal to the render loop; the previous overlay stays in place.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    #[error("annotation failed: {0}")]
    Failed(String),

    /// The engine task ended without reporting back
    #[error("annotation task aborted")]
    Aborted,
}

/// Computes labeled regions for a frame
///
/// The scheduler calls `detect` for at most one frame at a time.
#[async_trait]
pub trait AnnotationEngine: Send + Sync + 'static {
    async fn detect(&self, frame: Frame) -> Result<Vec<Region>, EngineError>;
}
