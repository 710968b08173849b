//! Encoder child process management
//!
//! The supervisor owns the external ffmpeg child: it synthesizes the
//! argument vector from the current config snapshot, pipes stdout through
//! the IVF de-muxer, and restarts the child whenever the registry signals
//! a change. Every (re)start bumps the stream epoch carried by each frame.

pub mod args;
pub mod ivf;
pub mod supervisor;

pub use args::build_args;
pub use ivf::demux;
pub use supervisor::EncoderSupervisor;

use std::sync::atomic::{AtomicU32, Ordering};

/// Monotonic stream-epoch counter, bumped on every encoder (re)start
#[derive(Debug, Default)]
pub struct EpochCounter(AtomicU32);

impl EpochCounter {
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Advance to the next epoch and return it.
    pub fn bump(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Epoch of the most recently started encoder.
    pub fn current(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}
