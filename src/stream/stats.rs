//! Pipeline counters
//!
//! Cheap atomic counters incremented on the hot path and sampled by the
//! periodic stats logger. Dropped-frame counts are the main signal that a
//! sink cannot keep up.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the fan-out and the pacing writer
#[derive(Debug, Default)]
pub struct StreamStats {
    frames: AtomicU64,
    bytes: AtomicU64,
    pacing_dropped: AtomicU64,
    fallback_dropped: AtomicU64,
    samples_written: AtomicU64,
}

impl StreamStats {
    /// A frame left the de-muxer.
    pub fn record_frame(&self, len: usize) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// The pacing queue was full.
    pub fn record_pacing_drop(&self) {
        self.pacing_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A client's binary queue was full.
    pub fn record_fallback_drop(&self) {
        self.fallback_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A sample went out on the WebRTC track.
    pub fn record_sample(&self) {
        self.samples_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            pacing_dropped: self.pacing_dropped.load(Ordering::Relaxed),
            fallback_dropped: self.fallback_dropped.load(Ordering::Relaxed),
            samples_written: self.samples_written.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStatsSnapshot {
    pub frames: u64,
    pub bytes: u64,
    pub pacing_dropped: u64,
    pub fallback_dropped: u64,
    pub samples_written: u64,
}
