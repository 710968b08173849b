//! Frame distribution
//!
//! The de-muxer hands every compressed frame to the fan-out, which feeds
//! two sinks with different back-pressure rules: the shared WebRTC sample
//! track (through the pacing writer) and each client's bounded WebSocket
//! binary queue.

pub mod fanout;
pub mod frame;
pub mod pacing;
pub mod stats;

pub use fanout::{ClientSink, FrameFanout, SINK_QUEUE_CAPACITY};
pub use frame::Frame;
pub use pacing::spawn_pacing_writer;
pub use stats::{StreamStats, StreamStatsSnapshot};
