//! Single-slot backpressure state
//!
//! At most one frame is with the engine and at most one waits behind it.
//! Newer frames overwrite the waiting one, so the overlay is never more than
//! one extra frame stale no matter how slow the engine is.

use std::time::Duration;

use crate::scheduler::engine::EngineError;
use crate::scheduler::frame::{AnnotationResult, Frame, Region, RenderedFrame};

/// Engine outcome for a submitted frame
#[derive(Debug)]
pub struct Completion {
    pub seq: u64,
    pub capture_ts_ms: f64,
    pub result: Result<Vec<Region>, EngineError>,
    pub engine_duration: Duration,
}

/// What a completion did to the scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Became the new overlay
    Applied,
    /// A newer result was already applied; discarded
    Superseded,
    /// Engine error; overlay unchanged
    Failed,
}

/// Counters for the scheduler's decisions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub frames: u64,
    pub submitted: u64,
    pub applied: u64,
    pub superseded: u64,
    /// Pending frames overwritten before submission
    pub dropped: u64,
    pub failed: u64,
}

/// Pending / in-flight / last-result state machine
#[derive(Debug)]
pub struct FrameScheduler {
    pending: Option<Frame>,
    in_flight: Option<u64>,
    last_result: Option<AnnotationResult>,
    submit_when_idle: bool,
    stats: SchedulerStats,
}

impl FrameScheduler {
    pub fn new(submit_when_idle: bool) -> Self {
        Self {
            pending: None,
            in_flight: None,
            last_result: None,
            submit_when_idle,
            stats: SchedulerStats::default(),
        }
    }

    /// Handle a render tick for `frame`
    ///
    /// Returns the frame to hand to the engine, if any. The caller must
    /// submit it; the scheduler already counts it as in flight.
    pub fn on_frame(&mut self, frame: &Frame) -> Option<Frame> {
        self.stats.frames += 1;

        if self.in_flight.is_some() {
            if self.pending.replace(frame.clone()).is_some() {
                self.stats.dropped += 1;
            }
            return None;
        }

        match self.pending.take() {
            Some(waiting) => {
                self.pending = Some(frame.clone());
                Some(self.mark_in_flight(waiting))
            }
            None if self.submit_when_idle => Some(self.mark_in_flight(frame.clone())),
            None => {
                self.pending = Some(frame.clone());
                None
            }
        }
    }

    /// Apply an engine completion
    pub fn on_completion(&mut self, completion: Completion) -> CompletionOutcome {
        if self.in_flight == Some(completion.seq) {
            self.in_flight = None;
        }

        let regions = match completion.result {
            Ok(regions) => regions,
            Err(e) => {
                self.stats.failed += 1;
                tracing::warn!(seq = completion.seq, error = %e, "Annotation failed");
                return CompletionOutcome::Failed;
            }
        };

        let newer = self
            .last_result
            .as_ref()
            .map_or(true, |current| completion.seq > current.seq);

        if !newer {
            self.stats.superseded += 1;
            tracing::debug!(seq = completion.seq, "Discarding superseded annotation");
            return CompletionOutcome::Superseded;
        }

        self.last_result = Some(AnnotationResult {
            seq: completion.seq,
            capture_ts_ms: completion.capture_ts_ms,
            regions,
            engine_duration: completion.engine_duration,
        });
        self.stats.applied += 1;
        CompletionOutcome::Applied
    }

    /// Pair the visible frame with the latest applied overlay
    pub fn render<'a>(&'a self, frame: &'a Frame) -> RenderedFrame<'a> {
        RenderedFrame {
            frame,
            overlay: self.last_result.as_ref(),
        }
    }

    pub fn pending(&self) -> Option<&Frame> {
        self.pending.as_ref()
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    pub fn last_result(&self) -> Option<&AnnotationResult> {
        self.last_result.as_ref()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    fn mark_in_flight(&mut self, frame: Frame) -> Frame {
        self.in_flight = Some(frame.seq);
        self.stats.submitted += 1;
        frame
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(true)
    }
}
