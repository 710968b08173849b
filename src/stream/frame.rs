//! Compressed video frame as emitted by the de-muxer

use bytes::Bytes;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// One complete compressed video frame, stripped of container framing.
///
/// `captured_at` is the local clock at the moment the de-muxer emitted the
/// frame; it is monotonic within one epoch. `wallclock_ms` carries the
/// same moment as Unix milliseconds for the WebSocket fallback framing.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Bytes,
    pub captured_at: Instant,
    pub wallclock_ms: f64,
    pub epoch: u32,
}

impl Frame {
    /// Stamp a frame payload with the current clock and its stream epoch.
    pub fn new(data: Bytes, epoch: u32) -> Self {
        let wallclock_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        Self {
            data,
            captured_at: Instant::now(),
            wallclock_ms,
            epoch,
        }
    }
}
