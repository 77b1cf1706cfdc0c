//! Transport byte counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative byte counts at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteSample {
    /// Bytes sent by this endpoint (uplink)
    pub sent: u64,
    /// Bytes received by this endpoint (downlink)
    pub received: u64,
}

/// Source of cumulative transport byte counts
///
/// Implemented by whatever owns the media transport. Counters only grow;
/// a decrease is treated as a reset.
pub trait ByteCounters: Send + Sync + 'static {
    fn bytes_sent(&self) -> u64;

    fn bytes_received(&self) -> u64;

    fn sample(&self) -> ByteSample {
        ByteSample {
            sent: self.bytes_sent(),
            received: self.bytes_received(),
        }
    }
}

/// Lock-free counters a transport can bump from any task
#[derive(Debug, Default)]
pub struct TransportCounters {
    sent: AtomicU64,
    received: AtomicU64,
}

impl TransportCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sent(&self, bytes: u64) {
        self.sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_received(&self, bytes: u64) {
        self.received.fetch_add(bytes, Ordering::Relaxed);
    }
}

impl ByteCounters for TransportCounters {
    fn bytes_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    fn bytes_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}
