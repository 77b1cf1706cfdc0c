//! Frames and annotation results

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// A decoded video frame as received by the viewer
#[derive(Debug, Clone)]
pub struct Frame {
    /// Producer-assigned, increasing
    pub seq: u64,
    /// Producer wall clock at capture, in milliseconds
    pub capture_ts_ms: f64,
    /// Viewer monotonic time at receipt
    pub arrival: Instant,
    /// Opaque decoded picture
    pub data: Bytes,
}

impl Frame {
    /// Create a frame stamped with the current arrival time
    pub fn new(seq: u64, capture_ts_ms: f64, data: Bytes) -> Self {
        Self {
            seq,
            capture_ts_ms,
            arrival: Instant::now(),
            data,
        }
    }
}

/// A labeled region with a box normalized to `0.0..=1.0`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub label: String,
    pub confidence: f32,
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl Region {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: [f32; 4]) -> Self {
        let [xmin, ymin, xmax, ymax] = bbox.map(|v| v.clamp(0.0, 1.0));
        Self {
            label: label.into(),
            confidence,
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }
}

/// Engine output for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationResult {
    pub seq: u64,
    pub capture_ts_ms: f64,
    pub regions: Vec<Region>,
    pub engine_duration: Duration,
}

/// What the overlay sink draws for one render tick
#[derive(Debug, Clone, Copy)]
pub struct RenderedFrame<'a> {
    /// The visible frame
    pub frame: &'a Frame,
    /// Most recent applied annotation, possibly for an older frame
    pub overlay: Option<&'a AnnotationResult>,
}

impl RenderedFrame<'_> {
    /// How many sequence numbers the overlay lags the visible frame
    pub fn staleness(&self) -> Option<u64> {
        self.overlay
            .map(|result| self.frame.seq.saturating_sub(result.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_clamps_box() {
        let region = Region::new("person", 0.9, [-0.1, 0.2, 1.4, 0.8]);

        assert_eq!(region.xmin, 0.0);
        assert_eq!(region.ymin, 0.2);
        assert_eq!(region.xmax, 1.0);
        assert_eq!(region.ymax, 0.8);
    }

    #[test]
    fn test_region_json_fields() {
        let region = Region::new("cup", 0.5, [0.1, 0.1, 0.2, 0.2]);
        let value = serde_json::to_value(&region).unwrap();

        assert_eq!(value["label"], "cup");
        assert!(value["xmin"].is_number());
        assert!(value["ymax"].is_number());
    }

    #[tokio::test]
    async fn test_staleness() {
        let frame = Frame::new(12, 0.0, Bytes::new());
        let result = AnnotationResult {
            seq: 10,
            capture_ts_ms: 0.0,
            regions: vec![],
            engine_duration: Duration::ZERO,
        };

        let rendered = RenderedFrame {
            frame: &frame,
            overlay: Some(&result),
        };
        assert_eq!(rendered.staleness(), Some(2));

        let bare = RenderedFrame {
            frame: &frame,
            overlay: None,
        };
        assert_eq!(bare.staleness(), None);
    }
}
